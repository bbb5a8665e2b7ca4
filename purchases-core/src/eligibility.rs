//! Introductory offer eligibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a subscriber may redeem a product's introductory offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntroEligibility {
    /// The backend could not decide, or was not asked.
    #[default]
    Unknown,
    /// The subscriber already used an introductory offer in this group.
    Ineligible,
    /// The introductory offer can be redeemed.
    Eligible,
}

impl IntroEligibility {
    /// Maps one entry of the backend's eligibility object.
    ///
    /// Only booleans carry meaning; anything else, including a missing
    /// entry, is [`IntroEligibility::Unknown`].
    pub fn from_response_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(true)) => Self::Eligible,
            Some(Value::Bool(false)) => Self::Ineligible,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_booleans_are_meaningful() {
        assert_eq!(IntroEligibility::from_response_value(Some(&json!(true))), IntroEligibility::Eligible);
        assert_eq!(IntroEligibility::from_response_value(Some(&json!(false))), IntroEligibility::Ineligible);
        assert_eq!(IntroEligibility::from_response_value(Some(&json!("true"))), IntroEligibility::Unknown);
        assert_eq!(IntroEligibility::from_response_value(Some(&json!(1))), IntroEligibility::Unknown);
        assert_eq!(IntroEligibility::from_response_value(None), IntroEligibility::Unknown);
    }
}
