//! Built-in rule tables
//!
//! Tag confidences and category weights are hand-tuned. Categories are listed
//! in priority order. Patterns are compiled case-insensitively; `['’]` accepts
//! both straight and curly apostrophes.

use super::engine::{AdaptiveRule, CategoryRule, RuleTable};
use crate::types::ClassifierId;

/// How the user regulates actions and emotions
pub static BEHAVIOR_REGULATION: RuleTable = RuleTable {
    classifier: ClassifierId::BehaviorRegulation,
    categories: &[
        CategoryRule {
            category: "emotional-outburst",
            label: "Emotional outbursts",
            confidence: 0.8,
            weight: 3.0,
            patterns: &[
                r"\b(?:lost|lose|losing) my temper\b",
                r"\b(?:blew|blow|blowing) up at\b",
                r"\bsnapp(?:ed|ing) at\b",
                r"\byell(?:ed|ing)? at\b",
                r"\bcan['’]?t calm (?:myself )?down\b",
            ],
        },
        CategoryRule {
            category: "avoidance",
            label: "Avoidance",
            confidence: 0.75,
            weight: 3.0,
            patterns: &[
                r"\bprocrastinat\w*",
                r"\b(?:put|putting|puts|push|pushing) (?:it|things|everything|this|that) off\b",
                r"\bavoid(?:ing|ed)?\b",
                r"\bcan['’]?t (?:bring|make) myself\b",
            ],
        },
        CategoryRule {
            category: "withdrawal",
            label: "Social withdrawal",
            confidence: 0.75,
            weight: 3.0,
            patterns: &[
                r"\bisolat(?:e|ed|ing)\b",
                r"\bstay(?:ed|ing)? in bed all day\b",
                r"\bdon['’]?t want to (?:see|talk to) anyone\b",
                r"\bshut (?:everyone|people|myself) out\b",
                r"\bcancel(?:l?ed|l?ing)? (?:plans|on (?:my )?friends)\b",
            ],
        },
        CategoryRule {
            category: "impulsivity",
            label: "Impulsive actions",
            confidence: 0.7,
            weight: 2.0,
            patterns: &[
                r"\bimpulsive(?:ly)?\b",
                r"\bwithout thinking\b",
                r"\bcouldn['’]?t stop myself\b",
                r"\bbing(?:e|ed|ing)\b",
                r"\bon a whim\b",
            ],
        },
        CategoryRule {
            category: "escape-numbing",
            label: "Escape and numbing",
            confidence: 0.7,
            weight: 2.0,
            patterns: &[
                r"\b(?:drink|drinking|drank) (?:to|until)\b",
                r"\bnumb (?:myself|out|the)\b",
                r"\bzoned? out\b",
                r"\bscroll(?:ing|ed)? for hours\b",
                r"\bjust to (?:forget|escape)\b",
            ],
        },
        CategoryRule {
            category: "compulsive-checking",
            label: "Compulsive checking",
            confidence: 0.65,
            weight: 2.0,
            patterns: &[
                r"\bkeep checking\b",
                r"\bcan['’]?t stop (?:checking|scrolling)\b",
                r"\bcheck(?:ed|ing)? (?:it )?(?:again and again|over and over)\b",
            ],
        },
        CategoryRule {
            category: "sleep-disruption",
            label: "Sleep disruption",
            confidence: 0.6,
            weight: 1.0,
            patterns: &[
                r"\bcan['’]?t sleep\b",
                r"\b(?:up|awake) all night\b",
                r"\binsomnia\b",
                r"\bbarely slept\b",
            ],
        },
    ],
    adaptive: AdaptiveRule {
        category: "coping-strategy",
        label: "Coping strategy",
        confidence: 0.7,
        patterns: &[
            r"\b(?:went|go|going) for a (?:walk|run)\b",
            r"\btook a (?:break|breath|pause)\b",
            r"\bdeep breath(?:s|ing)?\b",
            r"\btalked to (?:a friend|someone|my therapist)\b",
            r"\bjournal(?:ed|ing)?\b",
            r"\bmeditat(?:e|ed|ing|ion)\b",
        ],
    },
};

/// How harshly the user evaluates themselves
pub static SELF_JUDGMENT: RuleTable = RuleTable {
    classifier: ClassifierId::SelfJudgment,
    categories: &[
        CategoryRule {
            category: "self-criticism",
            label: "Self-criticism",
            confidence: 0.85,
            weight: 4.0,
            patterns: &[
                r"\b(?:i['’]?m|i am) (?:(?:such|so|a|an|just|really|totally|complete|such an) )*(?:failure|loser|idiot|stupid|worthless|useless|pathetic|disappointment)\b",
                r"\bi hate myself\b",
                r"\bwhat['’]?s wrong with me\b",
                r"\bi['’]?m the worst\b",
            ],
        },
        CategoryRule {
            category: "global-incompetence",
            label: "Global incompetence",
            confidence: 0.8,
            weight: 3.0,
            patterns: &[
                r"\bcan['’]?t do anything right\b",
                r"\bi (?:always|constantly) (?:mess|screw) (?:things |it |everything )?up\b",
                r"\bi ruin everything\b",
                r"\bi['’]?m bad at everything\b",
                r"\bnothing i do (?:is|works)\b",
            ],
        },
        CategoryRule {
            category: "shame",
            label: "Shame",
            confidence: 0.8,
            weight: 3.0,
            patterns: &[
                r"\bashamed\b",
                r"\bembarrass(?:ed|ing)? (?:of|by) myself\b",
                r"\bhumiliat(?:ed|ing)\b",
                r"\bdisgusted (?:with|by) myself\b",
            ],
        },
        CategoryRule {
            category: "perfectionism",
            label: "Perfectionism",
            confidence: 0.75,
            weight: 3.0,
            patterns: &[
                r"\b(?:has|have|had|needs?) to be perfect\b",
                r"\b(?:not|never) good enough\b",
                r"\bshould(?:['’]?ve| have) done better\b",
                r"\bany mistake\b",
            ],
        },
        CategoryRule {
            category: "impostor",
            label: "Impostor feelings",
            confidence: 0.7,
            weight: 2.0,
            patterns: &[
                r"\bfraud\b",
                r"\bimpost[eo]r\b",
                r"\bdon['’]?t deserve\b",
                r"\bthey['’]?ll (?:find out|realize)\b",
            ],
        },
        CategoryRule {
            category: "comparison",
            label: "Unfavorable comparison",
            confidence: 0.65,
            weight: 2.0,
            patterns: &[
                r"\beveryone else (?:is|has|can|seems)\b",
                r"\b(?:better|smarter|prettier|stronger) than me\b",
                r"\bcompar(?:e|ed|ing) myself\b",
            ],
        },
    ],
    adaptive: AdaptiveRule {
        category: "self-compassion",
        label: "Self-compassion",
        confidence: 0.7,
        patterns: &[
            r"\b(?:be|being) (?:kind|gentle|easier|patient) (?:to|on|with) myself\b",
            r"\bi did (?:my|the) best\b",
            r"\bproud of myself\b",
            r"\b(?:it['’]?s|it is) okay to (?:make mistakes|fail|struggle)\b",
            r"\bi['’]?m (?:still )?learning\b",
            r"\bforgive myself\b",
        ],
    },
};

/// Distorted thinking patterns
pub static COGNITIVE_PATTERN: RuleTable = RuleTable {
    classifier: ClassifierId::CognitivePattern,
    categories: &[
        CategoryRule {
            category: "catastrophizing",
            label: "Catastrophizing",
            confidence: 0.8,
            weight: 3.0,
            patterns: &[
                r"\b(?:worst|terrible|awful) (?:thing|case|possible)\b",
                r"\b(?:disaster|catastroph\w*)\b",
                r"\b(?:it['’]?s|this is|feels like) the end of the world\b",
                r"\b(?:everything|my life) (?:is|will be) ruined\b",
                r"\bfall(?:ing)? apart\b",
            ],
        },
        CategoryRule {
            category: "all-or-nothing",
            label: "All-or-nothing thinking",
            confidence: 0.75,
            weight: 3.0,
            patterns: &[
                r"\b(?:complete|total|utter)(?:ly)? (?:failure|waste|disaster|mess)\b",
                r"\ball or nothing\b",
                r"\b(?:perfect|flawless) or (?:nothing|worthless|a failure)\b",
                r"\bif (?:it['’]?s|it is) not perfect\b",
            ],
        },
        CategoryRule {
            category: "overgeneralization",
            label: "Overgeneralization",
            confidence: 0.7,
            weight: 2.0,
            patterns: &[
                r"\bnothing ever\b",
                r"\bevery (?:single )?time\b",
                r"\b(?:this|it) always happens\b",
                r"\bi['’]?ll never\b",
                r"\b(?:no one|nobody) ever\b",
            ],
        },
        CategoryRule {
            category: "mind-reading",
            label: "Mind reading",
            confidence: 0.7,
            weight: 2.0,
            patterns: &[
                r"\b(?:they|he|she|everyone|people) (?:must|probably|definitely) (?:think|thinks|hate|hates|judge|judges)\b",
                r"\b(?:they|he|she|everyone|people) thinks? i['’]?m\b",
                r"\bi know (?:they|he|she) (?:hate|hates|judge|judges|think|thinks)\b",
            ],
        },
        CategoryRule {
            category: "fortune-telling",
            label: "Fortune telling",
            confidence: 0.65,
            weight: 2.0,
            patterns: &[
                r"\b(?:it|this)(?:['’]ll| will) (?:never work|go wrong|fail)\b",
                r"\bbound to fail\b",
                r"\bno point (?:in )?trying\b",
                r"\bgoing to (?:fail|mess up|go wrong)\b",
            ],
        },
        CategoryRule {
            category: "personalization",
            label: "Personalization",
            confidence: 0.7,
            weight: 2.0,
            patterns: &[
                r"\b(?:it['’]?s|it is|all) my fault\b",
                r"\bbecause of me\b",
                r"\bi['’]?m (?:to blame|responsible for everything)\b",
            ],
        },
        CategoryRule {
            category: "emotional-reasoning",
            label: "Emotional reasoning",
            confidence: 0.65,
            weight: 2.0,
            patterns: &[
                r"\bi feel (?:like )?(?:a |an )?(?:failure|idiot|burden|fraud),? so\b",
                r"\bi feel it,? so it must\b",
                r"\bbecause i feel\b",
            ],
        },
        CategoryRule {
            category: "should-statements",
            label: "Should statements",
            confidence: 0.6,
            weight: 1.0,
            patterns: &[
                r"\bi (?:should|must|ought to) (?:have|be|always)\b",
                r"\bi shouldn['’]?t have\b",
            ],
        },
    ],
    adaptive: AdaptiveRule {
        category: "balanced-thinking",
        label: "Balanced thinking",
        confidence: 0.7,
        patterns: &[
            r"\bon the other hand\b",
            r"\bmaybe (?:it['’]?s|it is) not (?:that|so) bad\b",
            r"\bthe evidence\b",
            r"\blook at it differently\b",
            r"\bnot the end of the world\b",
            r"\bboth can be true\b",
        ],
    },
};

/// Rule table for a built-in classifier
pub fn table_for(id: ClassifierId) -> &'static RuleTable {
    match id {
        ClassifierId::BehaviorRegulation => &BEHAVIOR_REGULATION,
        ClassifierId::SelfJudgment => &SELF_JUDGMENT,
        ClassifierId::CognitivePattern => &COGNITIVE_PATTERN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::engine::Classifier;
    use crate::config::ScoringConfig;
    use std::collections::HashSet;

    fn classify(id: ClassifierId, messages: &[&str]) -> crate::types::Analysis {
        Classifier::new(table_for(id), ScoringConfig::default())
            .unwrap()
            .classify(messages)
    }

    #[test]
    fn test_tables_are_well_formed() {
        for id in ClassifierId::ALL {
            let table = table_for(id);
            assert_eq!(table.classifier, id);
            assert!((5..=8).contains(&table.categories.len()), "{id} category count");

            let mut seen = HashSet::new();
            for rule in table.categories {
                assert!(seen.insert(rule.category), "duplicate category {}", rule.category);
                assert!((0.6..=0.85).contains(&rule.confidence), "{} confidence", rule.category);
                assert!((1.0..=4.0).contains(&rule.weight), "{} weight", rule.category);
                assert!(!rule.patterns.is_empty());
            }
            assert!(!table.adaptive.patterns.is_empty());
            assert!(Classifier::new(table, ScoringConfig::default()).is_ok());
        }
    }

    #[test]
    fn test_self_criticism_scenario() {
        let analysis = classify(
            ClassifierId::SelfJudgment,
            &["I'm such a failure, I can't do anything right"],
        );
        assert!(analysis.confidence >= 0.6);
        assert!(analysis.has_category("self-criticism"));
        assert!(analysis.matched_signals.contains("global-incompetence"));
    }

    #[test]
    fn test_behavior_regulation_signals() {
        let analysis = classify(
            ClassifierId::BehaviorRegulation,
            &[
                "I snapped at my partner again last night",
                "and I keep putting things off at work, just avoiding my inbox",
            ],
        );
        assert!(analysis.has_category("emotional-outburst"));
        assert!(analysis.has_category("avoidance"));
        // 3 + 3 → 1.0
        assert_eq!(analysis.confidence, 1.0);
    }

    #[test]
    fn test_coping_lowers_behavior_score() {
        let analysis = classify(
            ClassifierId::BehaviorRegulation,
            &["I couldn't stop myself from ordering, but then I went for a walk"],
        );
        assert!(analysis.has_category("impulsivity"));
        assert!(analysis.has_category("coping-strategy"));
        // 2 - 1 → 1/6
        assert!((analysis.confidence - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cognitive_patterns() {
        let analysis = classify(
            ClassifierId::CognitivePattern,
            &["This is a total disaster and it's all my fault, it always happens"],
        );
        assert!(analysis.has_category("catastrophizing"));
        assert!(analysis.has_category("all-or-nothing"));
        assert!(analysis.has_category("personalization"));
        assert!(analysis.has_category("overgeneralization"));
        assert_eq!(analysis.confidence, 1.0);
    }

    #[test]
    fn test_balanced_thinking_is_not_catastrophizing() {
        let analysis = classify(
            ClassifierId::CognitivePattern,
            &["It's not the end of the world, I guess"],
        );
        assert!(!analysis.has_category("catastrophizing"));
        assert!(analysis.has_category("balanced-thinking"));
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn test_neutral_text_scores_zero() {
        for id in ClassifierId::ALL {
            let analysis = classify(id, &["The weather is nice and I had pasta for lunch."]);
            assert_eq!(analysis.confidence, 0.0, "{id}");
            assert!(analysis.tags.is_empty(), "{id}");
        }
    }

    #[test]
    fn test_curly_apostrophes() {
        let analysis = classify(ClassifierId::SelfJudgment, &["I’m so stupid"]);
        assert!(analysis.has_category("self-criticism"));
    }
}
