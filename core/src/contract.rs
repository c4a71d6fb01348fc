//! Method parameter contracts
//!
//! Turns an explicit typed parameter-descriptor list plus optional UI
//! annotations into the validated, serializable contract the service uses
//! to render a remote control surface for the method.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WavebindError};
use crate::session::Metadata;

pub const MAX_PARAMS: usize = 12;
pub const MAX_PARAM_NAME_LEN: usize = 36;

/// Invocation arguments keyed by parameter name
pub type ArgMap = HashMap<String, Value>;

/// The closed set of parameter types a method may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    /// A file reference; carried as a local path string or null
    File,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "str",
            ParamKind::File => "file",
        }
    }

    /// Type-appropriate default when the method declares none
    pub fn default_value(&self) -> Value {
        match self {
            ParamKind::Bool => Value::Bool(false),
            ParamKind::Int => Value::from(0),
            ParamKind::Float => Value::from(0.0),
            ParamKind::Str => Value::from(""),
            ParamKind::File => Value::Null,
        }
    }

    /// Whether a JSON value is acceptable for this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Int => value.is_i64() || value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::Str => value.is_string(),
            ParamKind::File => value.is_string() || value.is_null(),
        }
    }
}

/// One declared parameter of the method being registered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Supported remote UI components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiComponentKind {
    Slider,
    MultiChoice,
}

impl UiComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiComponentKind::Slider => "slider",
            UiComponentKind::MultiChoice => "multi_choice",
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            UiComponentKind::Slider => &["min", "max", "step", "default"],
            UiComponentKind::MultiChoice => &["options", "default"],
        }
    }
}

/// UI annotation attached to one parameter by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_component: Option<UiComponentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl UiAnnotation {
    pub fn slider(min: f64, max: f64, step: f64, default: impl Into<Value>) -> Self {
        Self {
            ui_component: Some(UiComponentKind::Slider),
            min: Some(min),
            max: Some(max),
            step: Some(step),
            default: Some(default.into()),
            options: None,
        }
    }

    pub fn multi_choice<I, S>(options: I, default: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ui_component: Some(UiComponentKind::MultiChoice),
            options: Some(options.into_iter().map(Into::into).collect()),
            default: Some(default.into()),
            min: None,
            max: None,
            step: None,
        }
    }

    fn missing_fields(&self, component: UiComponentKind) -> Vec<&'static str> {
        component
            .required_fields()
            .iter()
            .filter(|field| match **field {
                "min" => self.min.is_none(),
                "max" => self.max.is_none(),
                "step" => self.step.is_none(),
                "options" => self.options.is_none(),
                "default" => self.default.is_none(),
                _ => false,
            })
            .copied()
            .collect()
    }
}

/// One validated parameter as it appears in the contract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub default_value: Value,
    pub ui_component: Option<UiComponentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// The full registered-method contract sent to the service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodContract {
    pub method_name: String,
    pub params: Vec<ParameterSpec>,
    pub author: String,
    pub name: String,
    pub description: String,
    pub version: String,
}

impl MethodContract {
    pub fn build(
        method_name: &str,
        descriptors: &[ParamDescriptor],
        annotations: &HashMap<String, UiAnnotation>,
        metadata: &Metadata,
    ) -> Result<Self> {
        let params = build_params(descriptors, annotations)?;
        Ok(Self {
            method_name: method_name.to_string(),
            params,
            author: metadata.author.clone(),
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            version: metadata.version.clone(),
        })
    }

    /// Rewrites the descriptive fields in place, leaving params untouched
    pub fn sync_metadata(&mut self, metadata: &Metadata) {
        self.author = metadata.author.clone();
        self.name = metadata.name.clone();
        self.description = metadata.description.clone();
        self.version = metadata.version.clone();
    }

    /// Fills absent call arguments from the contract defaults
    pub fn fill_defaults(&self, args: &mut ArgMap) {
        for param in &self.params {
            args.entry(param.name.clone())
                .or_insert_with(|| param.default_value.clone());
        }
    }
}

/// Validation pipeline: count, names, defaults, then UI annotations.
/// Any violation aborts with an error naming the offending parameter.
pub fn build_params(
    descriptors: &[ParamDescriptor],
    annotations: &HashMap<String, UiAnnotation>,
) -> Result<Vec<ParameterSpec>> {
    if descriptors.len() > MAX_PARAMS {
        return Err(WavebindError::TooManyParameters {
            count: descriptors.len(),
            max: MAX_PARAMS,
        });
    }

    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if descriptor.name.len() > MAX_PARAM_NAME_LEN {
            return Err(WavebindError::ParameterNameTooLong {
                name: descriptor.name.clone(),
                max: MAX_PARAM_NAME_LEN,
            });
        }
        if !seen.insert(descriptor.name.as_str()) {
            return Err(WavebindError::DuplicateParameter {
                name: descriptor.name.clone(),
            });
        }
    }

    for name in annotations.keys() {
        if !descriptors.iter().any(|d| d.name == *name) {
            return Err(WavebindError::UnknownUiParameter { name: name.clone() });
        }
    }

    let mut params = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let default_value = match &descriptor.default {
            Some(value) => {
                if !descriptor.kind.accepts(value) {
                    return Err(WavebindError::DefaultTypeMismatch {
                        name: descriptor.name.clone(),
                        kind: descriptor.kind.as_str(),
                    });
                }
                value.clone()
            }
            None => descriptor.kind.default_value(),
        };

        let mut spec = ParameterSpec {
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            default_value,
            ui_component: None,
            min: None,
            max: None,
            step: None,
            options: None,
        };

        if let Some(annotation) = annotations.get(&descriptor.name) {
            if let Some(component) = annotation.ui_component {
                let missing = annotation.missing_fields(component);
                if !missing.is_empty() {
                    return Err(WavebindError::MissingUiFields {
                        name: descriptor.name.clone(),
                        component: component.as_str(),
                        missing,
                    });
                }
                spec.ui_component = Some(component);
                spec.min = annotation.min;
                spec.max = annotation.max;
                spec.step = annotation.step;
                spec.options = annotation.options.clone();
            }
            if let Some(default) = &annotation.default {
                if !descriptor.kind.accepts(default) {
                    return Err(WavebindError::DefaultTypeMismatch {
                        name: descriptor.name.clone(),
                        kind: descriptor.kind.as_str(),
                    });
                }
                spec.default_value = default.clone();
            }
        }

        params.push(spec);
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_annotations() -> HashMap<String, UiAnnotation> {
        HashMap::new()
    }

    #[test]
    fn test_builds_specs_in_declaration_order() {
        let descriptors = vec![
            ParamDescriptor::new("a", ParamKind::Int),
            ParamDescriptor::new("b", ParamKind::Float),
            ParamDescriptor::new("c", ParamKind::Str),
            ParamDescriptor::new("d", ParamKind::File),
        ];

        let params = build_params(&descriptors, &no_annotations()).unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].name, "a");
        assert_eq!(params[0].default_value, json!(0));
        assert_eq!(params[1].name, "b");
        assert_eq!(params[1].default_value, json!(0.0));
        assert_eq!(params[2].name, "c");
        assert_eq!(params[2].default_value, json!(""));
        assert_eq!(params[3].name, "d");
        assert_eq!(params[3].default_value, Value::Null);
        assert!(params.iter().all(|p| p.ui_component.is_none()));
    }

    #[test]
    fn test_rejects_too_many_parameters() {
        let descriptors: Vec<_> = (0..13)
            .map(|i| ParamDescriptor::new(format!("p{}", i), ParamKind::Int))
            .collect();
        let err = build_params(&descriptors, &no_annotations()).unwrap_err();
        assert!(matches!(
            err,
            WavebindError::TooManyParameters { count: 13, max: 12 }
        ));
    }

    #[test]
    fn test_rejects_overlong_name() {
        let long_name = "a".repeat(37);
        let descriptors = vec![ParamDescriptor::new(long_name.clone(), ParamKind::Bool)];
        let err = build_params(&descriptors, &no_annotations()).unwrap_err();
        assert!(err.to_string().contains(&long_name));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let descriptors = vec![
            ParamDescriptor::new("gain", ParamKind::Float),
            ParamDescriptor::new("gain", ParamKind::Int),
        ];
        let err = build_params(&descriptors, &no_annotations()).unwrap_err();
        assert!(matches!(err, WavebindError::DuplicateParameter { name } if name == "gain"));
    }

    #[test]
    fn test_rejects_default_kind_mismatch() {
        let descriptors = vec![ParamDescriptor::new("count", ParamKind::Int).with_default("three")];
        let err = build_params(&descriptors, &no_annotations()).unwrap_err();
        assert!(matches!(
            err,
            WavebindError::DefaultTypeMismatch { ref name, kind: "int" } if name == "count"
        ));
    }

    #[test]
    fn test_slider_requires_all_fields() {
        let descriptors = vec![ParamDescriptor::new("level", ParamKind::Int)];
        let annotation = UiAnnotation {
            ui_component: Some(UiComponentKind::Slider),
            min: Some(0.0),
            max: Some(10.0),
            ..Default::default()
        };
        let annotations = HashMap::from([("level".to_string(), annotation)]);

        let err = build_params(&descriptors, &annotations).unwrap_err();
        match err {
            WavebindError::MissingUiFields {
                name,
                component,
                missing,
            } => {
                assert_eq!(name, "level");
                assert_eq!(component, "slider");
                assert!(missing.contains(&"step"));
                assert!(missing.contains(&"default"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multi_choice_requires_options() {
        let descriptors = vec![ParamDescriptor::new("fruit", ParamKind::Str)];
        let annotation = UiAnnotation {
            ui_component: Some(UiComponentKind::MultiChoice),
            default: Some(json!("grapes")),
            ..Default::default()
        };
        let annotations = HashMap::from([("fruit".to_string(), annotation)]);

        let err = build_params(&descriptors, &annotations).unwrap_err();
        assert!(matches!(
            err,
            WavebindError::MissingUiFields { component: "multi_choice", ref missing, .. }
                if missing == &vec!["options"]
        ));
    }

    #[test]
    fn test_annotation_default_overrides_computed_default() {
        let descriptors = vec![ParamDescriptor::new("level", ParamKind::Int)];
        let annotations = HashMap::from([(
            "level".to_string(),
            UiAnnotation::slider(0.0, 10.0, 1.0, 5),
        )]);

        let params = build_params(&descriptors, &annotations).unwrap();
        assert_eq!(params[0].default_value, json!(5));
        assert_eq!(params[0].ui_component, Some(UiComponentKind::Slider));
        assert_eq!(params[0].min, Some(0.0));
        assert_eq!(params[0].step, Some(1.0));
    }

    #[test]
    fn test_rejects_annotation_for_unknown_parameter() {
        let descriptors = vec![ParamDescriptor::new("level", ParamKind::Int)];
        let annotations = HashMap::from([(
            "missing".to_string(),
            UiAnnotation::slider(0.0, 1.0, 0.1, 0),
        )]);

        let err = build_params(&descriptors, &annotations).unwrap_err();
        assert!(matches!(err, WavebindError::UnknownUiParameter { name } if name == "missing"));
    }

    #[test]
    fn test_fill_defaults_merges_absent_args() {
        let descriptors = vec![
            ParamDescriptor::new("a", ParamKind::Int),
            ParamDescriptor::new("b", ParamKind::Float).with_default(2.2),
            ParamDescriptor::new("c", ParamKind::Str).with_default("hi"),
        ];
        let contract = MethodContract::build(
            "f",
            &descriptors,
            &no_annotations(),
            &Metadata::default(),
        )
        .unwrap();

        let mut args = ArgMap::from([("a".to_string(), json!(3))]);
        contract.fill_defaults(&mut args);

        assert_eq!(args["a"], json!(3));
        assert_eq!(args["b"], json!(2.2));
        assert_eq!(args["c"], json!("hi"));
    }

    #[test]
    fn test_contract_serialization_shape() {
        let descriptors = vec![ParamDescriptor::new("clip", ParamKind::File)];
        let contract = MethodContract::build(
            "passthrough",
            &descriptors,
            &no_annotations(),
            &Metadata::default(),
        )
        .unwrap();

        let value = serde_json::to_value(&contract).unwrap();
        assert_eq!(value["method_name"], "passthrough");
        assert_eq!(value["params"][0]["type"], "file");
        assert_eq!(value["params"][0]["default_value"], Value::Null);
        assert_eq!(value["params"][0]["ui_component"], Value::Null);
        assert_eq!(value["name"], "Default Name");
        assert_eq!(value["version"], "0.0.0");
    }
}
