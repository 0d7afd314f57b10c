//! Text listings of whole classes, for logging and debugging transformations.

use std::fmt::Write;

use crate::model::access_flags;
use crate::model::class_def::{ClassDef, MethodBody};

/// Renders a class definition: its declaration, fields, and each method with its body.
pub fn disassemble_class(def: &ClassDef) -> String {
    let mut out = String::new();
    for annotation in &def.annotations {
        let _ = writeln!(out, "{}", annotation);
    }
    let kind = if def.is_interface() { "interface" } else { "class" };
    let mut flags = def.access_flags & !access_flags::ACC_INTERFACE;
    if def.is_interface() {
        flags &= !access_flags::ACC_ABSTRACT;
    }
    let modifiers = access_flags::to_keywords(flags);
    let _ = write!(out, "{}{} {}", prefix(&modifiers), kind, def.name);
    if let Some(ref super_name) = def.super_name {
        if super_name != "java.lang.Object" {
            let _ = write!(out, " extends {}", super_name);
        }
    }
    if !def.interfaces.is_empty() {
        let verb = if def.is_interface() { "extends" } else { "implements" };
        let _ = write!(out, " {} {}", verb, def.interfaces.join(", "));
    }
    out.push_str(" {\n");

    for field in &def.fields {
        for annotation in &field.annotations {
            let _ = writeln!(out, "    {}", annotation);
        }
        let modifiers = access_flags::to_keywords(field.access_flags);
        let _ = write!(out, "    {}{} {}", prefix(&modifiers), field.ty, field.name);
        if let Some(ref value) = field.constant_value {
            let _ = write!(out, " = {}", value);
        }
        out.push_str(";\n");
    }

    for method in &def.methods {
        out.push('\n');
        for annotation in &method.annotations {
            let _ = writeln!(out, "    {}", annotation);
        }
        let _ = write!(out, "    {}", method.description);
        match method.body {
            MethodBody::Abstract => out.push_str(";\n"),
            MethodBody::Native(_) => out.push_str(" <native>;\n"),
            MethodBody::Code(ref code) => {
                let _ = writeln!(out, " {{  // locals: {}, stack: {}",
                                 code.max_locals, code.max_stack);
                for line in code.disassemble().lines() {
                    let _ = writeln!(out, "    {}", line);
                }
                out.push_str("    }\n");
            },
        }
    }
    out.push_str("}\n");
    out
}

fn prefix(modifiers: &str) -> String {
    if modifiers.is_empty() {
        String::new()
    } else {
        format!("{} ", modifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::class_def::FieldDef;
    use crate::model::method::MethodDescription;
    use crate::model::types::TypeName;

    #[test]
    fn lists_members_and_bodies() {
        let mut def = ClassDef::new("demo.Counter", "java.lang.Object")
            .with_interface("java.lang.Runnable");
        def.add_field(FieldDef::new(access_flags::ACC_PRIVATE, TypeName::int(), "count"));
        def.add_default_constructor().unwrap();
        def.add_abstract_method(MethodDescription::new(TypeName::void(), "run", vec![]));

        let text = disassemble_class(&def);
        assert!(text.starts_with("public class demo.Counter implements java.lang.Runnable {\n"));
        assert!(text.contains("    private int count;\n"));
        assert!(text.contains("invokespecial java.lang.Object.<init>()V"));
        assert!(text.contains("    public abstract void run();\n"));
    }
}
