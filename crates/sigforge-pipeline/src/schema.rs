//! Declarative structural contracts for every stage's input and output.
//!
//! A schema is checked field by field in declaration order; the first failing
//! field is reported as a [`SchemaViolation`] with its dotted path. Only a
//! candidate that passes is deserialized into its typed form. Values are
//! never coerced: `"175"` is not a number and `null` is not "absent".

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use sigforge_types::{parse_timestamp, SchemaViolation, Stage};

// ---------------------------------------------------------------------------
// FieldKind / FieldSpec / ObjectSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    NonEmptyString,
    Number,
    Boolean,
    /// ISO-8601 timestamp carried as a string.
    Timestamp,
    Enum(Vec<String>),
    Object(ObjectSchema),
}

impl FieldKind {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldKind::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Human-readable constraint used in violation messages.
    pub fn describe(&self) -> String {
        match self {
            FieldKind::String => "string".into(),
            FieldKind::NonEmptyString => "non-empty string".into(),
            FieldKind::Number => "number".into(),
            FieldKind::Boolean => "boolean".into(),
            FieldKind::Timestamp => "ISO-8601 timestamp string".into(),
            FieldKind::Enum(values) => format!("one of [{}]", values.join(", ")),
            FieldKind::Object(_) => "object".into(),
        }
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let ok = match self {
            FieldKind::String => value.is_string(),
            FieldKind::NonEmptyString => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Timestamp => value.as_str().and_then(parse_timestamp).is_some(),
            FieldKind::Enum(values) => value
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v == s)),
            FieldKind::Object(schema) => return schema.check_at(value, path),
        };
        if ok {
            Ok(())
        } else {
            Err(SchemaViolation::new(path, self.describe()))
        }
    }

    fn to_json_schema(&self, description: &str) -> Value {
        let mut schema = match self {
            FieldKind::String => json!({ "type": "string" }),
            FieldKind::NonEmptyString => json!({ "type": "string", "minLength": 1 }),
            FieldKind::Number => json!({ "type": "number" }),
            FieldKind::Boolean => json!({ "type": "boolean" }),
            FieldKind::Timestamp => json!({ "type": "string", "format": "date-time" }),
            FieldKind::Enum(values) => json!({ "type": "string", "enum": values }),
            FieldKind::Object(schema) => schema.to_json_schema(),
        };
        if !description.is_empty() {
            schema["description"] = json!(description);
        }
        schema
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub fields: Vec<FieldSpec>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, false, description)
    }

    fn field(mut self, name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `candidate` and report the first failing field.
    pub fn check(&self, candidate: &Value) -> Result<(), SchemaViolation> {
        self.check_at(candidate, "")
    }

    fn check_at(&self, candidate: &Value, prefix: &str) -> Result<(), SchemaViolation> {
        let object = candidate.as_object().ok_or_else(|| {
            SchemaViolation::new(if prefix.is_empty() { "$" } else { prefix }, "object")
        })?;

        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{prefix}.{}", field.name)
            };
            match object.get(&field.name) {
                None if field.required => {
                    return Err(SchemaViolation::new(
                        path,
                        format!("required {}", field.kind.describe()),
                    ));
                }
                None => {}
                Some(Value::Null) if field.required => {
                    return Err(SchemaViolation::new(
                        path,
                        format!("required {}, found null", field.kind.describe()),
                    ));
                }
                Some(Value::Null) => {
                    return Err(SchemaViolation::new(
                        path,
                        format!("{} or an absent field, found null", field.kind.describe()),
                    ));
                }
                Some(value) => field.kind.check(value, &path)?,
            }
        }
        Ok(())
    }

    /// JSON Schema rendering handed to the completion service.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                field.kind.to_json_schema(&field.description),
            );
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaDirection {
    Input,
    Output,
}

#[derive(Debug, Clone)]
struct StageSchemas {
    input: ObjectSchema,
    output: ObjectSchema,
}

/// One canonical input/output schema pair per stage.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    stages: HashMap<Stage, StageSchemas>,
}

impl SchemaRegistry {
    pub fn new<I, S>(timeframes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let timeframes: Vec<String> = timeframes.into_iter().map(Into::into).collect();

        let request = ObjectSchema::new()
            .required(
                "asset",
                FieldKind::NonEmptyString,
                "The asset for the trading signal (e.g., AAPL or EUR/USD).",
            )
            .required(
                "approximateTimestamp",
                FieldKind::Timestamp,
                "The approximate date/time for the signal (UTC).",
            );

        let parameters = signal_parameters(&timeframes);

        let proposed = parameters.clone().required(
            "asset",
            FieldKind::NonEmptyString,
            "The asset for the trading signal.",
        );

        let outcome = ObjectSchema::new()
            .required(
                "confidenceLevel",
                FieldKind::one_of(["High", "Medium", "Low"]),
                "Confidence based on historical success rates under similar market conditions.",
            )
            .required(
                "reasoning",
                FieldKind::String,
                "Reasoning for the assigned confidence level.",
            )
            .required(
                "isValid",
                FieldKind::Boolean,
                "Whether the signal is valid (Medium or High confidence).",
            );

        let summary_input = ObjectSchema::new()
            .required("proposedSignal", FieldKind::Object(proposed.clone()), "")
            .required("validationOutcome", FieldKind::Object(outcome.clone()), "");

        let summary = ObjectSchema::new().required(
            "shortMessage",
            FieldKind::NonEmptyString,
            "A very concise (1-2 sentences) summary of the signal and its validation.",
        );

        let mut stages = HashMap::new();
        stages.insert(
            Stage::Generate,
            StageSchemas {
                input: request,
                output: parameters,
            },
        );
        stages.insert(
            Stage::Validate,
            StageSchemas {
                input: proposed,
                output: outcome,
            },
        );
        stages.insert(
            Stage::Summarize,
            StageSchemas {
                input: summary_input,
                output: summary,
            },
        );

        Self { stages }
    }

    pub fn schema(&self, stage: Stage, direction: SchemaDirection) -> &ObjectSchema {
        // Every stage is registered in `new`.
        let schemas = &self.stages[&stage];
        match direction {
            SchemaDirection::Input => &schemas.input,
            SchemaDirection::Output => &schemas.output,
        }
    }

    /// Check `candidate` against a stage schema and deserialize it on success.
    pub fn validate<T: DeserializeOwned>(
        &self,
        stage: Stage,
        direction: SchemaDirection,
        candidate: &Value,
    ) -> Result<T, SchemaViolation> {
        self.schema(stage, direction).check(candidate)?;
        T::deserialize(candidate).map_err(|e| SchemaViolation::new("$", e.to_string()))
    }
}

fn signal_parameters(timeframes: &[String]) -> ObjectSchema {
    ObjectSchema::new()
        .required(
            "signalIdentifier",
            FieldKind::String,
            "A concise identifier, often the asset and a descriptive tag (e.g., \"AAPL - Momentum Surge\").",
        )
        .required(
            "timeframe",
            FieldKind::Enum(timeframes.to_vec()),
            "The timeframe of the trading signal.",
        )
        .required(
            "tradeDirection",
            FieldKind::one_of(["BUY", "SELL"]),
            "BUY if the first take profit is above entry, SELL if below.",
        )
        .required("entryPrice", FieldKind::Number, "The entry price.")
        .required("takeProfit1", FieldKind::Number, "The first take profit price.")
        .optional(
            "takeProfit2",
            FieldKind::Number,
            "An optional second take profit price. Omit when not applicable.",
        )
        .required("stopLoss", FieldKind::Number, "The stop loss price.")
        .required(
            "reason",
            FieldKind::NonEmptyString,
            "A concise technical or fundamental reason for the signal.",
        )
        .required(
            "exactTimestamp",
            FieldKind::Timestamp,
            "The exact signal timestamp (UTC ISO format) near the requested time.",
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigforge_types::{ConfidenceLevel, SignalParameters, TradeDirection, ValidationOutcome};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(["1H", "4H", "1D"])
    }

    fn generated() -> Value {
        json!({
            "signalIdentifier": "AAPL-Test",
            "timeframe": "1H",
            "tradeDirection": "BUY",
            "entryPrice": 175,
            "takeProfit1": 180,
            "stopLoss": 172,
            "reason": "test",
            "exactTimestamp": "2024-01-01T01:00:00Z"
        })
    }

    fn violation(candidate: Value) -> SchemaViolation {
        registry()
            .validate::<SignalParameters>(Stage::Generate, SchemaDirection::Output, &candidate)
            .unwrap_err()
    }

    #[test]
    fn valid_generation_output_deserializes() {
        let params: SignalParameters = registry()
            .validate(Stage::Generate, SchemaDirection::Output, &generated())
            .unwrap();
        assert_eq!(params.trade_direction, TradeDirection::Buy);
        assert_eq!(params.entry_price, 175.0);
        assert_eq!(params.take_profit2, None);
    }

    #[test]
    fn unknown_trade_direction_is_rejected() {
        let mut candidate = generated();
        candidate["tradeDirection"] = json!("HOLD");
        let v = violation(candidate);
        assert_eq!(v.path, "tradeDirection");
        assert_eq!(v.expected, "one of [BUY, SELL]");
    }

    #[test]
    fn timeframe_outside_configured_set_is_rejected() {
        let mut candidate = generated();
        candidate["timeframe"] = json!("1m");
        let v = violation(candidate);
        assert_eq!(v.path, "timeframe");
        assert_eq!(v.expected, "one of [1H, 4H, 1D]");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut candidate = generated();
        candidate.as_object_mut().unwrap().remove("stopLoss");
        let v = violation(candidate);
        assert_eq!(v.path, "stopLoss");
        assert_eq!(v.expected, "required number");
    }

    #[test]
    fn numeric_string_is_not_coerced() {
        let mut candidate = generated();
        candidate["entryPrice"] = json!("175");
        assert_eq!(violation(candidate).path, "entryPrice");
    }

    #[test]
    fn first_failing_field_in_declaration_order_wins() {
        let mut candidate = generated();
        candidate["reason"] = json!("");
        candidate["timeframe"] = json!("3D");
        assert_eq!(violation(candidate).path, "timeframe");
    }

    #[test]
    fn null_optional_field_is_rejected() {
        let mut candidate = generated();
        candidate["takeProfit2"] = Value::Null;
        let v = violation(candidate);
        assert_eq!(v.path, "takeProfit2");
        assert!(v.expected.contains("found null"));
    }

    #[test]
    fn zero_optional_field_is_kept_distinct_from_absent() {
        let mut candidate = generated();
        candidate["takeProfit2"] = json!(0);
        let params: SignalParameters = registry()
            .validate(Stage::Generate, SchemaDirection::Output, &candidate)
            .unwrap();
        assert_eq!(params.take_profit2, Some(0.0));
    }

    #[test]
    fn unparseable_timestamp_is_rejected() {
        let mut candidate = generated();
        candidate["exactTimestamp"] = json!("next tuesday");
        assert_eq!(violation(candidate).path, "exactTimestamp");
    }

    #[test]
    fn non_object_candidate_reports_root() {
        let v = violation(json!(["BUY"]));
        assert_eq!(v.path, "$");
        assert_eq!(v.expected, "object");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut candidate = generated();
        candidate["asset"] = json!("MSFT");
        candidate["confidence"] = json!(0.9);
        assert!(registry()
            .validate::<SignalParameters>(Stage::Generate, SchemaDirection::Output, &candidate)
            .is_ok());
    }

    #[test]
    fn confidence_level_is_a_closed_set() {
        let candidate = json!({
            "confidenceLevel": "Very High",
            "reasoning": "strong",
            "isValid": true
        });
        let v = registry()
            .validate::<ValidationOutcome>(Stage::Validate, SchemaDirection::Output, &candidate)
            .unwrap_err();
        assert_eq!(v.path, "confidenceLevel");

        let candidate = json!({
            "confidenceLevel": "Medium",
            "reasoning": "ok",
            "isValid": true
        });
        let outcome: ValidationOutcome = registry()
            .validate(Stage::Validate, SchemaDirection::Output, &candidate)
            .unwrap();
        assert_eq!(outcome.confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn nested_paths_are_dotted() {
        let mut proposed = generated();
        proposed["asset"] = json!("AAPL");
        proposed["timeframe"] = json!("2W");
        let candidate = json!({
            "proposedSignal": proposed,
            "validationOutcome": { "confidenceLevel": "High", "reasoning": "ok", "isValid": true }
        });
        let v = registry()
            .schema(Stage::Summarize, SchemaDirection::Input)
            .check(&candidate)
            .unwrap_err();
        assert_eq!(v.path, "proposedSignal.timeframe");

        let v = registry()
            .schema(Stage::Summarize, SchemaDirection::Input)
            .check(&json!({ "proposedSignal": 3 }))
            .unwrap_err();
        assert_eq!(v.path, "proposedSignal");
        assert_eq!(v.expected, "object");
    }

    #[test]
    fn validation_is_idempotent() {
        let registry = registry();
        let candidate = generated();
        let first: SignalParameters = registry
            .validate(Stage::Generate, SchemaDirection::Output, &candidate)
            .unwrap();
        let second: SignalParameters = registry
            .validate(Stage::Generate, SchemaDirection::Output, &candidate)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(candidate, generated());

        let mut bad = generated();
        bad["tradeDirection"] = json!("HOLD");
        let a = registry
            .validate::<SignalParameters>(Stage::Generate, SchemaDirection::Output, &bad)
            .unwrap_err();
        let b = registry
            .validate::<SignalParameters>(Stage::Generate, SchemaDirection::Output, &bad)
            .unwrap_err();
        assert_eq!(a, b);
    }

    #[test]
    fn json_schema_rendering() {
        let schema = registry()
            .schema(Stage::Generate, SchemaDirection::Output)
            .to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["tradeDirection"]["enum"], json!(["BUY", "SELL"]));
        assert_eq!(schema["properties"]["timeframe"]["enum"], json!(["1H", "4H", "1D"]));
        assert_eq!(schema["properties"]["exactTimestamp"]["format"], "date-time");

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"takeProfit1"));
        assert!(!required.contains(&"takeProfit2"));
        assert!(!required.contains(&"asset"));
    }

    #[test]
    fn every_stage_has_both_schemas() {
        let registry = registry();
        for stage in Stage::ALL {
            assert!(!registry.schema(stage, SchemaDirection::Input).fields.is_empty());
            assert!(!registry.schema(stage, SchemaDirection::Output).fields.is_empty());
        }
    }

    #[test]
    fn proposed_signal_schema_extends_parameters_with_asset() {
        let registry = registry();
        let input = registry.schema(Stage::Validate, SchemaDirection::Input);
        let output = registry.schema(Stage::Generate, SchemaDirection::Output);
        assert_eq!(input.fields.len(), output.fields.len() + 1);
        assert!(input.field_spec("asset").unwrap().required);
    }
}
