// =============================================================================
// Managed objects: explicit registration instead of reflection
// =============================================================================
//
// A management console never sees concrete types. It looks an object up by
// its `ObjectName` in the `Registry` and talks to it through the `Managed`
// capability set: describe, read/write attributes, invoke operations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{PrimerError, Result};

lazy_static! {
    static ref DOMAIN: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
    static ref PROPERTY: Regex = Regex::new(r"^([A-Za-z0-9_.\-]+)=([^,=:*?]+)$").unwrap();
}

// =============================================================================
// Object names
// =============================================================================

/// `domain:key=value[,key=value...]`, with keys kept in sorted order so two
/// spellings of the same name compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectName {
    domain: String,
    properties: BTreeMap<String, String>,
}

impl ObjectName {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| PrimerError::InvalidObjectName {
            name: input.to_string(),
            reason: reason.to_string(),
        };

        let (domain, rest) = input
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' between domain and properties"))?;

        if !DOMAIN.is_match(domain) {
            return Err(invalid("domain must be letters, digits, '.', '_' or '-'"));
        }
        if rest.is_empty() {
            return Err(invalid("at least one key=value property is required"));
        }

        let mut properties = BTreeMap::new();
        for pair in rest.split(',') {
            let caps = PROPERTY
                .captures(pair)
                .ok_or_else(|| invalid("properties must look like key=value"))?;
            if properties
                .insert(caps[1].to_string(), caps[2].to_string())
                .is_some()
            {
                return Err(invalid("duplicate property key"));
            }
        }

        Ok(Self {
            domain: domain.to_string(),
            properties,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.domain)?;
        for (i, (key, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectName {
    type Err = PrimerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// =============================================================================
// Capability set
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    pub name: &'static str,
    pub params: Vec<&'static str>,
    pub returns: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    pub description: &'static str,
    pub attributes: Vec<AttributeInfo>,
    pub operations: Vec<OperationInfo>,
}

/// What a console may do with a registered object.
pub trait Managed: Send {
    fn describe(&self) -> Descriptor;
    fn get_attribute(&self, name: &str) -> Option<Value>;
    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()>;
    fn invoke(&mut self, operation: &str, args: &[Value]) -> Result<Value>;
}

// =============================================================================
// The record
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRecord {
    label: String,
    counter: i64,
}

impl ManagedRecord {
    pub fn new(label: impl Into<String>, counter: i64) -> Self {
        Self {
            label: label.into(),
            counter,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    /// The counter never decreases; overflow saturates.
    pub fn increment(&mut self, by: u32) -> i64 {
        self.counter = self.counter.saturating_add(i64::from(by));
        self.counter
    }

    pub fn print_greeting(&self, name: &str) -> String {
        let greeting = format!("hello, {name}");
        info!(label = %self.label, "{greeting}");
        greeting
    }

    pub fn add(&self, x: i64, y: i64) -> i64 {
        x.saturating_add(y)
    }
}

fn arity(operation: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(PrimerError::invalid_argument(
            operation,
            format!("expected {expected} argument(s), got {}", args.len()),
        ))
    }
}

fn as_str<'a>(operation: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| PrimerError::invalid_argument(operation, format!("expected a string, got {value}")))
}

fn as_int(operation: &str, value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| PrimerError::invalid_argument(operation, format!("expected an integer, got {value}")))
}

impl Managed for ManagedRecord {
    fn describe(&self) -> Descriptor {
        Descriptor {
            description: "Mutable label with an increment-only counter",
            attributes: vec![
                AttributeInfo { name: "label", kind: "string", writable: true },
                AttributeInfo { name: "counter", kind: "integer", writable: false },
            ],
            operations: vec![
                OperationInfo { name: "print_greeting", params: vec!["name: string"], returns: "string" },
                OperationInfo { name: "increment", params: vec!["by: integer >= 0"], returns: "integer" },
                OperationInfo { name: "add", params: vec!["x: integer", "y: integer"], returns: "integer" },
                OperationInfo { name: "get_label", params: vec![], returns: "string" },
                OperationInfo { name: "set_label", params: vec!["label: string"], returns: "null" },
                OperationInfo { name: "get_counter", params: vec![], returns: "integer" },
            ],
        }
    }

    fn get_attribute(&self, name: &str) -> Option<Value> {
        match name {
            "label" => Some(json!(self.label)),
            "counter" => Some(json!(self.counter)),
            _ => None,
        }
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "label" => {
                let label = as_str("set label", &value)?;
                self.set_label(label);
                Ok(())
            }
            "counter" => Err(PrimerError::ReadOnlyAttribute(name.to_string())),
            _ => Err(PrimerError::UnknownAttribute {
                object: "ManagedRecord".to_string(),
                attribute: name.to_string(),
            }),
        }
    }

    fn invoke(&mut self, operation: &str, args: &[Value]) -> Result<Value> {
        match operation {
            "print_greeting" => {
                arity(operation, args, 1)?;
                Ok(json!(self.print_greeting(as_str(operation, &args[0])?)))
            }
            "increment" => {
                arity(operation, args, 1)?;
                let by = as_int(operation, &args[0])?;
                let by = u32::try_from(by).map_err(|_| {
                    PrimerError::invalid_argument(
                        operation,
                        format!("{by} must be between 0 and {}", u32::MAX),
                    )
                })?;
                Ok(json!(self.increment(by)))
            }
            "add" => {
                arity(operation, args, 2)?;
                let x = as_int(operation, &args[0])?;
                let y = as_int(operation, &args[1])?;
                Ok(json!(self.add(x, y)))
            }
            "get_label" => {
                arity(operation, args, 0)?;
                Ok(json!(self.label))
            }
            "set_label" => {
                arity(operation, args, 1)?;
                self.set_label(as_str(operation, &args[0])?);
                Ok(Value::Null)
            }
            "get_counter" => {
                arity(operation, args, 0)?;
                Ok(json!(self.counter))
            }
            _ => Err(PrimerError::UnknownOperation {
                object: "ManagedRecord".to_string(),
                operation: operation.to_string(),
            }),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
pub struct Registry {
    objects: BTreeMap<ObjectName, Box<dyn Managed>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: ObjectName, object: Box<dyn Managed>) -> Result<()> {
        if self.objects.contains_key(&name) {
            return Err(PrimerError::AlreadyRegistered(name.to_string()));
        }
        info!(object = %name, "registered");
        self.objects.insert(name, object);
        Ok(())
    }

    pub fn unregister(&mut self, name: &ObjectName) -> Result<Box<dyn Managed>> {
        let object = self
            .objects
            .remove(name)
            .ok_or_else(|| PrimerError::UnknownObject(name.to_string()))?;
        info!(object = %name, "unregistered");
        Ok(object)
    }

    pub fn names(&self) -> impl Iterator<Item = &ObjectName> {
        self.objects.keys()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn lookup(&self, name: &ObjectName) -> Result<&dyn Managed> {
        self.objects
            .get(name)
            .map(|object| &**object)
            .ok_or_else(|| PrimerError::UnknownObject(name.to_string()))
    }

    fn lookup_mut(&mut self, name: &ObjectName) -> Result<&mut Box<dyn Managed>> {
        self.objects
            .get_mut(name)
            .ok_or_else(|| PrimerError::UnknownObject(name.to_string()))
    }

    pub fn describe(&self, name: &ObjectName) -> Result<Descriptor> {
        Ok(self.lookup(name)?.describe())
    }

    pub fn get_attribute(&self, name: &ObjectName, attribute: &str) -> Result<Value> {
        self.lookup(name)?
            .get_attribute(attribute)
            .ok_or_else(|| PrimerError::UnknownAttribute {
                object: name.to_string(),
                attribute: attribute.to_string(),
            })
    }

    pub fn set_attribute(&mut self, name: &ObjectName, attribute: &str, value: Value) -> Result<()> {
        debug!(object = %name, attribute, %value, "set attribute");
        self.lookup_mut(name)?
            .set_attribute(attribute, value)
            .map_err(|err| match err {
                PrimerError::UnknownAttribute { attribute, .. } => PrimerError::UnknownAttribute {
                    object: name.to_string(),
                    attribute,
                },
                other => other,
            })
    }

    pub fn invoke(&mut self, name: &ObjectName, operation: &str, args: &[Value]) -> Result<Value> {
        debug!(object = %name, operation, ?args, "invoke");
        self.lookup_mut(name)?
            .invoke(operation, args)
            .map_err(|err| match err {
                PrimerError::UnknownOperation { operation, .. } => PrimerError::UnknownOperation {
                    object: name.to_string(),
                    operation,
                },
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeter() -> ObjectName {
        ObjectName::parse("primers:type=Greeter").unwrap()
    }

    fn registry_with(record: ManagedRecord) -> Registry {
        let mut registry = Registry::new();
        registry.register(greeter(), Box::new(record)).unwrap();
        registry
    }

    #[test]
    fn test_record_increment_and_label() {
        let mut record = ManagedRecord::new("x", 5);
        record.increment(3);
        assert_eq!(record.counter(), 8);

        record.set_label("y");
        assert_eq!(record.label(), "y");
    }

    #[test]
    fn test_record_through_registry() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let name = greeter();

        assert_eq!(registry.invoke(&name, "increment", &[json!(3)]).unwrap(), json!(8));
        assert_eq!(registry.invoke(&name, "get_counter", &[]).unwrap(), json!(8));

        registry.invoke(&name, "set_label", &[json!("y")]).unwrap();
        assert_eq!(registry.invoke(&name, "get_label", &[]).unwrap(), json!("y"));
        assert_eq!(registry.get_attribute(&name, "label").unwrap(), json!("y"));
    }

    #[test]
    fn test_print_greeting_and_add() {
        let mut registry = registry_with(ManagedRecord::new("x", 0));
        let name = greeter();

        let greeting = registry.invoke(&name, "print_greeting", &[json!("world")]).unwrap();
        assert_eq!(greeting, json!("hello, world"));
        assert_eq!(registry.invoke(&name, "add", &[json!(2), json!(40)]).unwrap(), json!(42));
    }

    #[test]
    fn test_negative_increment_rejected() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let name = greeter();

        let err = registry.invoke(&name, "increment", &[json!(-1)]).unwrap_err();
        assert!(matches!(err, PrimerError::InvalidArgument { .. }));
        assert_eq!(registry.get_attribute(&name, "counter").unwrap(), json!(5));
    }

    #[test]
    fn test_increment_range_message() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let name = greeter();

        for by in [json!(-1), json!(5_000_000_000i64)] {
            let err = registry.invoke(&name, "increment", &[by]).unwrap_err();
            assert!(
                err.to_string().contains("must be between 0 and 4294967295"),
                "unexpected message: {err}"
            );
        }
        assert_eq!(
            registry.invoke(&name, "increment", &[json!(u32::MAX)]).unwrap(),
            json!(5 + i64::from(u32::MAX))
        );
    }

    #[test]
    fn test_counter_is_read_only() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let err = registry
            .set_attribute(&greeter(), "counter", json!(100))
            .unwrap_err();
        assert!(matches!(err, PrimerError::ReadOnlyAttribute(_)));
    }

    #[test]
    fn test_unknown_operation_names_object() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let err = registry.invoke(&greeter(), "reset", &[]).unwrap_err();
        match err {
            PrimerError::UnknownOperation { object, operation } => {
                assert_eq!(object, "primers:type=Greeter");
                assert_eq!(operation, "reset");
            }
            other => panic!("Expected UnknownOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_arity_and_type() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let name = greeter();

        assert!(registry.invoke(&name, "add", &[json!(1)]).is_err());
        assert!(registry.invoke(&name, "set_label", &[json!(1)]).is_err());
        assert!(registry.set_attribute(&name, "label", json!(false)).is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        let err = registry
            .register(greeter(), Box::new(ManagedRecord::new("z", 0)))
            .unwrap_err();
        assert!(matches!(err, PrimerError::AlreadyRegistered(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = registry_with(ManagedRecord::new("x", 5));
        registry.unregister(&greeter()).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get_attribute(&greeter(), "label"),
            Err(PrimerError::UnknownObject(_))
        ));
    }

    #[test]
    fn test_describe_serializes() {
        let registry = registry_with(ManagedRecord::new("x", 5));
        let descriptor = registry.describe(&greeter()).unwrap();
        let value = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(value["attributes"][0]["name"], "label");
        assert_eq!(value["attributes"][1]["type"], "integer");
        assert_eq!(descriptor.operations.len(), 6);
    }

    #[test]
    fn test_object_name_canonical_order() {
        let a: ObjectName = "primers:type=Greeter,name=main".parse().unwrap();
        let b: ObjectName = "primers:name=main,type=Greeter".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "primers:name=main,type=Greeter");
        assert_eq!(a.domain(), "primers");
        assert_eq!(a.property("type"), Some("Greeter"));
    }

    #[test]
    fn test_object_name_rejects_malformed() {
        for bad in ["primers", "primers:", ":type=x", "primers:type", "primers:type=a,type=b", "pri mers:type=x"] {
            assert!(ObjectName::parse(bad).is_err(), "{bad} should be rejected");
        }
    }
}
