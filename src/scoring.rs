//! Relevance boosting driven by an availability signal.

use serde_json::Map;

use crate::models::{MagnitudeParameters, ScoringFunction, ScoringProfile};
use crate::schema::Schema;

pub const AVAILABILITY_FIELD: &str = "availability";
pub const AVAILABILITY_PROFILE: &str = "availabilityBoost";

/// Linear magnitude boost over `[0, 1]` on `field_name`, continuing past the
/// range end. Functions are summed.
pub fn build_availability_scoring_profile(field_name: &str) -> ScoringProfile {
    ScoringProfile {
        name: AVAILABILITY_PROFILE.to_string(),
        function_aggregation: Some("sum".to_string()),
        functions: vec![ScoringFunction {
            kind: "magnitude".to_string(),
            field_name: field_name.to_string(),
            boost: 2.0,
            interpolation: Some("linear".to_string()),
            magnitude: Some(MagnitudeParameters {
                boosting_range_start: 0.0,
                boosting_range_end: 1.0,
                constant_boost_beyond_range: true,
            }),
            extra: Map::new(),
        }],
        extra: Map::new(),
    }
}

/// The availability profile, if the schema declares the signal field.
pub fn scoring_profile_for(schema: &Schema) -> Option<ScoringProfile> {
    schema
        .contains(AVAILABILITY_FIELD)
        .then(|| build_availability_scoring_profile(AVAILABILITY_FIELD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_shape() {
        let profile = build_availability_scoring_profile("availability");
        assert_eq!(profile.name, "availabilityBoost");
        assert_eq!(profile.function_aggregation.as_deref(), Some("sum"));
        let f = &profile.functions[0];
        assert_eq!(f.kind, "magnitude");
        assert_eq!(f.interpolation.as_deref(), Some("linear"));
        let m = f.magnitude.as_ref().unwrap();
        assert_eq!((m.boosting_range_start, m.boosting_range_end), (0.0, 1.0));
        assert!(m.constant_boost_beyond_range);
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(build_availability_scoring_profile("availability")).unwrap();
        assert_eq!(value["functionAggregation"], json!("sum"));
        assert_eq!(value["functions"][0]["type"], json!("magnitude"));
        assert_eq!(value["functions"][0]["fieldName"], json!("availability"));
        assert_eq!(
            value["functions"][0]["magnitude"]["constantBoostBeyondRange"],
            json!(true)
        );
    }

    #[test]
    fn test_only_when_field_declared() {
        let with = Schema::from_value(&json!({"fields": [
            {"name": "id", "type": "Edm.String", "key": true},
            {"name": "availability", "type": "Edm.Double"}
        ]}))
        .unwrap();
        let without = with.without_field("availability");
        assert!(scoring_profile_for(&with).is_some());
        assert!(scoring_profile_for(&without).is_none());
    }
}
