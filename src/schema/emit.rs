//! Rust source output for compiled definitions
//!
//! Every record becomes a struct and every sum type an enum, both deriving
//! `Decode` and `Encode` with `#[tlb(...)]` attributes carrying the tags and
//! by-reference placements. The output imports the library prelude and
//! nothing else.

use std::fmt::Write as _;

use crate::directive::{Directive, Placement, Record, TypeDefinition, TypeKind, WireType};

#[derive(Clone, Debug)]
pub struct EmitOptions {
    /// Prepended to every generated type name
    pub type_prefix: String,
    /// Path under which the library is visible to the generated module
    pub crate_path: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            type_prefix: String::new(),
            crate_path: "tlb".to_owned(),
        }
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "do", "dyn", "else",
    "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in", "let", "loop", "macro",
    "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return", "self", "Self",
    "static", "struct", "super", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// `block_info` and `blockInfo` both become `BlockInfo`
#[must_use]
pub fn to_camel_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// `seqNo` becomes `seq_no`; keywords gain a trailing underscore
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

struct Emitter<'a> {
    opts: &'a EmitOptions,
    /// Generated name of the definition being emitted
    current: String,
}

impl Emitter<'_> {
    fn type_name(&self, name: &str) -> String {
        format!("{}{}", to_camel_case(&self.opts.type_prefix), to_camel_case(name))
    }

    fn key_type(bits: usize) -> String {
        match bits {
            8 | 16 | 32 | 64 => format!("u{}", bits),
            256 => "Bits256".to_owned(),
            n if n < 64 => format!("Uint<{}>", n),
            n => format!("Bits<{}>", n),
        }
    }

    fn rust_type(&self, wire: &WireType) -> String {
        match wire {
            WireType::Bool => "bool".to_owned(),
            WireType::Uint(n @ (8 | 16 | 32 | 64)) => format!("u{}", n),
            WireType::Uint(n) | WireType::BoundedUint { bits: n, .. } if *n < 64 => {
                format!("Uint<{}>", n)
            }
            WireType::Int(n @ (8 | 16 | 32 | 64)) => format!("i{}", n),
            WireType::Int(n) if *n < 64 => format!("Int<{}>", n),
            WireType::Bits(256) => "Bits256".to_owned(),
            WireType::Uint(n)
            | WireType::Int(n)
            | WireType::Bits(n)
            | WireType::BoundedUint { bits: n, .. } => format!("Bits<{}>", n),
            WireType::VarUInteger(16) => "Coins".to_owned(),
            WireType::VarUInteger(n) => format!("VarUInteger<{}>", n),
            WireType::Unit => "()".to_owned(),
            WireType::Any => "Cell".to_owned(),
            WireType::Named(name) => {
                let rust = self.type_name(name);
                if rust == self.current {
                    format!("Box<{}>", rust)
                } else {
                    rust
                }
            }
            WireType::Ref(inner) => format!("Ref<{}>", self.rust_type(inner)),
            WireType::Maybe(inner) => format!("Option<{}>", self.rust_type(inner)),
            WireType::Either(l, r) => {
                format!("Either<{}, {}>", self.rust_type(l), self.rust_type(r))
            }
            WireType::EitherRef(inner) => format!("EitherRef<{}>", self.rust_type(inner)),
            WireType::Hashmap { key_bits, value } => format!(
                "Hashmap<{}, {}>",
                Self::key_type(*key_bits),
                self.rust_type(value)
            ),
            WireType::HashmapE { key_bits, value } => format!(
                "HashmapE<{}, {}>",
                Self::key_type(*key_bits),
                self.rust_type(value)
            ),
            WireType::HashmapAugE {
                key_bits,
                value,
                extra,
            } => format!(
                "HashmapAugE<{}, {}, {}>",
                Self::key_type(*key_bits),
                self.rust_type(value),
                self.rust_type(extra)
            ),
        }
    }

    fn fields(&self, out: &mut String, directives: &[Directive], indent: &str, vis: &str) {
        for d in directives {
            if matches!(d.placement, Placement::ByRef(_)) {
                let _ = writeln!(out, "{}#[tlb(by_ref)]", indent);
            }
            let _ = writeln!(
                out,
                "{}{}{}: {},",
                indent,
                vis,
                to_snake_case(&d.name),
                self.rust_type(&d.wire)
            );
        }
    }

    fn record(&self, out: &mut String, record: &Record) {
        if let Some(tag) = record.tag {
            let _ = writeln!(out, "#[tlb(tag = \"{}\")]", tag);
        }
        if record.directives.is_empty() {
            let _ = writeln!(out, "pub struct {};", self.current);
            return;
        }
        let _ = writeln!(out, "pub struct {} {{", self.current);
        self.fields(out, &record.directives, "    ", "pub ");
        let _ = writeln!(out, "}}");
    }

    fn definition(&self, out: &mut String, def: &TypeDefinition) {
        const DERIVES: &str = "#[derive(Clone, Debug, PartialEq, Decode, Encode)]";
        match &def.kind {
            TypeKind::Record(record) => {
                let _ = writeln!(out, "{}", DERIVES);
                self.record(out, record);
            }
            TypeKind::SumType(variants) => {
                let _ = writeln!(out, "{}", DERIVES);
                let _ = writeln!(out, "pub enum {} {{", self.current);
                for v in variants {
                    let _ = writeln!(out, "    #[tlb(tag = \"{}\")]", v.tag);
                    let name = to_camel_case(&v.name);
                    if v.record.directives.is_empty() {
                        let _ = writeln!(out, "    {},", name);
                    } else {
                        let _ = writeln!(out, "    {} {{", name);
                        self.fields(out, &v.record.directives, "        ", "");
                        let _ = writeln!(out, "    }},");
                    }
                }
                let _ = writeln!(out, "}}");
            }
            TypeKind::Custom => {
                let _ = writeln!(
                    out,
                    "// `{}` is provided by a hand-written codec",
                    self.current
                );
            }
        }
    }
}

/// Renders `defs` as a Rust module body
#[must_use]
pub fn rust_module(defs: &[TypeDefinition], opts: &EmitOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Code generated by tlb-gen. DO NOT EDIT.");
    let _ = writeln!(out);
    let _ = writeln!(out, "use {}::prelude::*;", opts.crate_path);
    for def in defs {
        let emitter = Emitter {
            opts,
            current: format!("{}{}", to_camel_case(&opts.type_prefix), to_camel_case(&def.name)),
        };
        let _ = writeln!(out);
        emitter.definition(&mut out, def);
    }
    out
}
