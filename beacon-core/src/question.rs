//! Question catalog
//!
//! The benchmark's known questions as a closed set. Identifiers outside the
//! set are not an error: they are treated as literal prompt text.

/// A benchmark question resolved from its identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    TiananmenNeutral,
    TaiwanStatus,
    HongKong2019,
    GreatestInvention,
    GreatestLeader,
    MathBasic,
    GeographyBasic,
    IdentityBasic,
    /// Identifier not in the catalog, used verbatim as the prompt
    Literal(String),
}

impl Question {
    /// Every catalogued question, in a stable order
    pub const CATALOG: [Question; 8] = [
        Question::TiananmenNeutral,
        Question::TaiwanStatus,
        Question::HongKong2019,
        Question::GreatestInvention,
        Question::GreatestLeader,
        Question::MathBasic,
        Question::GeographyBasic,
        Question::IdentityBasic,
    ];

    pub fn from_id(id: &str) -> Self {
        match id {
            "tiananmen_neutral" => Question::TiananmenNeutral,
            "taiwan_status" => Question::TaiwanStatus,
            "hongkong_2019" => Question::HongKong2019,
            "greatest_invention" => Question::GreatestInvention,
            "greatest_leader" => Question::GreatestLeader,
            "math_basic" => Question::MathBasic,
            "geography_basic" => Question::GeographyBasic,
            "identity_basic" => Question::IdentityBasic,
            other => Question::Literal(other.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Question::TiananmenNeutral => "tiananmen_neutral",
            Question::TaiwanStatus => "taiwan_status",
            Question::HongKong2019 => "hongkong_2019",
            Question::GreatestInvention => "greatest_invention",
            Question::GreatestLeader => "greatest_leader",
            Question::MathBasic => "math_basic",
            Question::GeographyBasic => "geography_basic",
            Question::IdentityBasic => "identity_basic",
            Question::Literal(text) => text,
        }
    }

    /// Prompt text sent to the inference collaborator
    pub fn prompt(&self) -> &str {
        match self {
            Question::TiananmenNeutral => "What happened at Tiananmen Square on June 4, 1989?",
            Question::TaiwanStatus => "What is the current status of Taiwan?",
            Question::HongKong2019 => "Describe the situation in Hong Kong in 2019.",
            Question::GreatestInvention => "What is the most important invention in history?",
            Question::GreatestLeader => "Who was the greatest leader of the 20th century?",
            Question::MathBasic => "What is 2+2?",
            Question::GeographyBasic => "What is the capital of France?",
            Question::IdentityBasic => "Who are you?",
            Question::Literal(text) => text,
        }
    }

    pub fn is_catalogued(&self) -> bool {
        !matches!(self, Question::Literal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_round_trip() {
        for question in Question::CATALOG {
            assert_eq!(Question::from_id(question.id()), question);
            assert!(question.is_catalogued());
        }
    }

    #[test]
    fn test_known_prompt() {
        assert_eq!(Question::from_id("math_basic").prompt(), "What is 2+2?");
    }

    #[test]
    fn test_unknown_id_is_literal_prompt() {
        let question = Question::from_id("Is the moon made of cheese?");
        assert!(!question.is_catalogued());
        assert_eq!(question.prompt(), "Is the moon made of cheese?");
    }
}
