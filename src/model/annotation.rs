//! Annotations attached to classes, fields, methods and method parameters.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::types::TypeName;

/// The value of one annotation element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
    Class(TypeName),
    Enum { type_name: TypeName, constant: String },
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

/// One annotation instance: its type and the explicitly given element values.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub annotation_type: String,
    pub elements: BTreeMap<String, ElementValue>,
}

impl Annotation {
    pub fn new(annotation_type: &str) -> Self {
        Annotation {
            annotation_type: annotation_type.to_string(),
            elements: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: ElementValue) -> Self {
        self.elements.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ElementValue> {
        self.elements.get(name)
    }

    /// The conventional single element, `value`, as a string.
    pub fn string_value(&self) -> Option<&str> {
        match self.get("value") {
            Some(ElementValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}", self.annotation_type)?;
        if !self.elements.is_empty() {
            let elements: Vec<String> = self.elements.iter()
                .map(|(k, v)| format!("{}={:?}", k, v))
                .collect();
            write!(f, "({})", elements.join(", "))?;
        }
        Ok(())
    }
}

/// Read access to the annotations of a class, field, method or parameter.
pub trait AnnotationAccess {
    fn annotations(&self) -> &[Annotation];

    fn get_annotation(&self, annotation_type: &str) -> Option<&Annotation> {
        self.annotations().iter().find(|a| a.annotation_type == annotation_type)
    }

    fn has_annotation(&self, annotation_type: &str) -> bool {
        self.get_annotation(annotation_type).is_some()
    }
}

impl AnnotationAccess for Vec<Annotation> {
    fn annotations(&self) -> &[Annotation] {
        self
    }
}

/// Annotations inherited from a class hierarchy: the nearest declaration of each type wins.
pub fn merge_inherited(own: &[Annotation], inherited: &[Annotation]) -> Vec<Annotation> {
    let mut merged = own.to_vec();
    for annotation in inherited {
        if !merged.iter().any(|a| a.annotation_type == annotation.annotation_type) {
            merged.push(annotation.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_type() {
        let annotations = vec![Annotation::new("org.example.Inject"),
                               Annotation::new("org.example.Symbol")
                                   .with("value", ElementValue::String("foo".to_string()))];
        assert!(annotations.has_annotation("org.example.Inject"));
        assert!(!annotations.has_annotation("org.example.Property"));
        assert_eq!(Some("foo"),
                   annotations.get_annotation("org.example.Symbol").and_then(|a| a.string_value()));
    }

    #[test]
    fn nearest_declaration_wins() {
        let own = vec![Annotation::new("a.Marker").with("value", ElementValue::Int(1))];
        let inherited = vec![Annotation::new("a.Marker").with("value", ElementValue::Int(2)),
                             Annotation::new("a.Other")];
        let merged = merge_inherited(&own, &inherited);
        assert_eq!(2, merged.len());
        assert_eq!(Some(&ElementValue::Int(1)), merged[0].get("value"));
    }
}
