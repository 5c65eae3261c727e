//! Declarations to directive models
//!
//! Declarations are grouped by result type in order of first appearance. A
//! group of one becomes a record; a larger group becomes a sum type whose
//! variants are dispatched on their tags. Type expressions resolve against
//! the built-in table, the caller's known types and every group's result
//! name, so forward references need no special treatment.

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use tracing::debug;

use super::ast::{CombinatorDeclaration, FieldDefinition, TypeExpression};
use super::error::{SchemaError, SchemaResult};
use crate::directive::{Directive, Record, TypeDefinition, TypeKind, Variant, WireType};
use crate::prim::{width_below, width_upto};

lazy_static! {
    /// Built-in type names with a fixed wire shape
    static ref BUILTINS: HashMap<&'static str, WireType> = {
        let mut m = HashMap::new();
        m.insert("#", WireType::Uint(32));
        m.insert("Bool", WireType::Bool);
        m.insert("Bit", WireType::Bool);
        m.insert("Cell", WireType::Any);
        m.insert("Any", WireType::Any);
        m.insert("Unit", WireType::Unit);
        m.insert("True", WireType::Unit);
        m.insert("Coins", WireType::VarUInteger(16));
        m.insert("Grams", WireType::VarUInteger(16));
        m
    };
}

/// Generic combinators resolved by the compiler, with their arity
const GENERICS: &[(&str, usize)] = &[
    ("Maybe", 1),
    ("Either", 2),
    ("Hashmap", 2),
    ("HashmapE", 2),
    ("HashmapAugE", 3),
    ("VarUInteger", 1),
    ("##", 1),
    ("#<", 1),
    ("#<=", 1),
];

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Drop the tags of single-constructor records
    pub skip_magic: bool,
    /// Names resolved as externally supplied types, decoded by a registered
    /// custom codec at runtime
    pub known_types: BTreeSet<String>,
}

impl CompileOptions {
    #[must_use]
    pub fn with_known_types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_types.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Width-suffixed built-ins: `uintN`, `intN`, `bitsN`
fn sized_builtin(name: &str) -> Option<WireType> {
    let (ctor, digits): (fn(usize) -> WireType, &str) = if let Some(d) = name.strip_prefix("uint") {
        (WireType::Uint, d)
    } else if let Some(d) = name.strip_prefix("int") {
        (WireType::Int, d)
    } else if let Some(d) = name.strip_prefix("bits") {
        (WireType::Bits, d)
    } else {
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(ctor)
}

struct Resolver<'a> {
    results: &'a BTreeSet<String>,
    options: &'a CompileOptions,
    /// `Result.constructor` of the declaration being compiled
    context: String,
}

impl<'a> Resolver<'a> {
    fn unsupported(&self, construct: impl Into<String>) -> SchemaError {
        SchemaError::Unsupported {
            construct: construct.into(),
            context: self.context.clone(),
        }
    }

    fn named(&self, name: &str) -> SchemaResult<WireType> {
        if let Some(wire) = BUILTINS.get(name) {
            return Ok(wire.clone());
        }
        if let Some(wire) = sized_builtin(name) {
            return Ok(wire);
        }
        if let Some((_, arity)) = GENERICS.iter().find(|(g, _)| *g == name) {
            return Err(SchemaError::WrongArity {
                name: name.to_owned(),
                expected: *arity,
                found: 0,
            });
        }
        if self.results.contains(name) || self.options.known_types.contains(name) {
            return Ok(WireType::named(name));
        }
        Err(SchemaError::UnresolvedType {
            name: name.to_owned(),
            context: self.context.clone(),
        })
    }

    fn number(&self, name: &str, args: &[TypeExpression], position: usize) -> SchemaResult<u64> {
        match args.get(position) {
            Some(TypeExpression::Number(n)) => Ok(*n),
            _ => Err(SchemaError::MissingNumericParameter {
                name: name.to_owned(),
                position,
            }),
        }
    }

    fn width(&self, name: &str, args: &[TypeExpression], position: usize) -> SchemaResult<usize> {
        let n = self.number(name, args, position)?;
        usize::try_from(n).map_err(|_| self.unsupported(format!("width {} of `{}`", n, name)))
    }

    /// Resolves a type expression in argument position, where `^T` is a
    /// type rather than a placement
    fn resolve(&self, expr: &TypeExpression) -> SchemaResult<WireType> {
        match expr {
            TypeExpression::Named(name) => self.named(name),
            TypeExpression::Number(n) => Err(self.unsupported(format!("numeric literal {} as a type", n))),
            TypeExpression::CellRef(inner) => Ok(WireType::Ref(Box::new(self.resolve(inner)?))),
            TypeExpression::Apply { name, args } => self.apply(name, args),
            TypeExpression::Conditional { flag, .. } => {
                Err(self.unsupported(format!("conditional field on `{}`", flag)))
            }
            TypeExpression::Anonymous(_) => Err(self.unsupported("anonymous constructor")),
            TypeExpression::Arithmetic(text) => {
                Err(self.unsupported(format!("type expression `{}`", text)))
            }
        }
    }

    fn apply(&self, name: &str, args: &[TypeExpression]) -> SchemaResult<WireType> {
        let arity = match GENERICS.iter().find(|(g, _)| *g == name) {
            Some((_, arity)) => *arity,
            None if self.results.contains(name)
                || self.options.known_types.contains(name)
                || BUILTINS.contains_key(name)
                || sized_builtin(name).is_some() =>
            {
                if args.is_empty() {
                    return self.named(name);
                }
                return Err(SchemaError::WrongArity {
                    name: name.to_owned(),
                    expected: 0,
                    found: args.len(),
                });
            }
            None => {
                return Err(SchemaError::UnresolvedType {
                    name: name.to_owned(),
                    context: self.context.clone(),
                })
            }
        };
        if args.len() != arity {
            return Err(SchemaError::WrongArity {
                name: name.to_owned(),
                expected: arity,
                found: args.len(),
            });
        }
        let wire = match name {
            "Maybe" => WireType::Maybe(Box::new(self.resolve(&args[0])?)),
            "Either" => {
                let left = self.resolve(&args[0])?;
                let right = self.resolve(&args[1])?;
                match right {
                    WireType::Ref(inner) if *inner == left => WireType::EitherRef(inner),
                    right => WireType::Either(Box::new(left), Box::new(right)),
                }
            }
            "Hashmap" => WireType::Hashmap {
                key_bits: self.width(name, args, 0)?,
                value: Box::new(self.resolve(&args[1])?),
            },
            "HashmapE" => WireType::HashmapE {
                key_bits: self.width(name, args, 0)?,
                value: Box::new(self.resolve(&args[1])?),
            },
            "HashmapAugE" => WireType::HashmapAugE {
                key_bits: self.width(name, args, 0)?,
                value: Box::new(self.resolve(&args[1])?),
                extra: Box::new(self.resolve(&args[2])?),
            },
            "VarUInteger" => WireType::VarUInteger(self.width(name, args, 0)?),
            "##" => {
                let bits = self.width(name, args, 0)?;
                if bits > 64 {
                    return Err(self.unsupported(format!("(## {}) wider than 64 bits", bits)));
                }
                WireType::Uint(bits)
            }
            "#<" => {
                let bound = self.number(name, args, 0)?;
                if bound == 0 {
                    return Err(self.unsupported("(#< 0)"));
                }
                WireType::BoundedUint {
                    bits: width_below(bound),
                    max: bound - 1,
                }
            }
            "#<=" => {
                let max = self.number(name, args, 0)?;
                WireType::BoundedUint {
                    bits: width_upto(max),
                    max,
                }
            }
            _ => {
                return Err(SchemaError::UnresolvedType {
                    name: name.to_owned(),
                    context: self.context.clone(),
                })
            }
        };
        Ok(wire)
    }

    fn directives(&self, fields: &[FieldDefinition]) -> SchemaResult<Vec<Directive>> {
        let mut out = Vec::new();
        for (index, field) in fields.iter().enumerate() {
            let (name, expr) = match field {
                FieldDefinition::Implicit(_) => continue,
                FieldDefinition::Named { name, expr } => (name.as_str(), expr),
                FieldDefinition::CellRef(expr) => {
                    let wire = self.resolve(expr)?;
                    out.push(Directive::by_ref(out.len(), format!("field{}", index), wire));
                    continue;
                }
            };
            let name = if name.is_empty() || name == "_" {
                format!("field{}", index)
            } else {
                name.to_owned()
            };
            let directive = match expr {
                TypeExpression::CellRef(inner) => {
                    Directive::by_ref(out.len(), name, self.resolve(inner)?)
                }
                other => Directive::inline(out.len(), name, self.resolve(other)?),
            };
            out.push(directive);
        }
        Ok(out)
    }
}

fn check_tags(result: &str, variants: &[Variant]) -> SchemaResult<()> {
    for (i, a) in variants.iter().enumerate() {
        for b in &variants[i + 1..] {
            if a.tag.is_prefix_of(&b.tag) || b.tag.is_prefix_of(&a.tag) {
                return Err(SchemaError::AmbiguousTags {
                    result: result.to_owned(),
                    first: (a.name.clone(), a.tag),
                    second: (b.name.clone(), b.tag),
                });
            }
        }
    }
    Ok(())
}

/// Compiles declarations into type definitions, one per result type
pub fn compile(
    declarations: &[CombinatorDeclaration],
    options: &CompileOptions,
) -> SchemaResult<Vec<TypeDefinition>> {
    let mut groups: Vec<(&str, Vec<&CombinatorDeclaration>)> = Vec::new();
    for decl in declarations {
        if !decl.result_params.is_empty() {
            return Err(SchemaError::ParameterizedCombinator {
                result: decl.result.clone(),
                constructor: decl.constructor.clone(),
            });
        }
        match groups.iter_mut().find(|(name, _)| *name == decl.result) {
            Some((_, members)) => members.push(decl),
            None => groups.push((decl.result.as_str(), vec![decl])),
        }
    }
    let results: BTreeSet<String> = groups.iter().map(|(name, _)| (*name).to_owned()).collect();

    let mut out = Vec::with_capacity(groups.len());
    for (result, members) in groups {
        let mut seen = BTreeSet::new();
        for decl in &members {
            if decl.constructor != "_" && !seen.insert(decl.constructor.as_str()) {
                return Err(SchemaError::DuplicateConstructor {
                    result: result.to_owned(),
                    constructor: decl.constructor.clone(),
                });
            }
        }

        let kind = if let [decl] = members.as_slice() {
            let resolver = Resolver {
                results: &results,
                options,
                context: format!("{}.{}", result, decl.constructor),
            };
            let tag = if options.skip_magic { None } else { decl.tag };
            debug!(%result, constructor = %decl.constructor, "compiling record");
            TypeKind::Record(Record {
                tag,
                directives: resolver.directives(&decl.fields)?,
            })
        } else {
            let mut variants = Vec::with_capacity(members.len());
            for decl in &members {
                let tag = decl.tag.ok_or_else(|| SchemaError::MissingDiscriminator {
                    result: result.to_owned(),
                    constructor: decl.constructor.clone(),
                })?;
                let resolver = Resolver {
                    results: &results,
                    options,
                    context: format!("{}.{}", result, decl.constructor),
                };
                variants.push(Variant {
                    name: decl.constructor.clone(),
                    tag,
                    record: Record {
                        tag: None,
                        directives: resolver.directives(&decl.fields)?,
                    },
                });
            }
            check_tags(result, &variants)?;
            debug!(%result, variants = variants.len(), "compiling sum type");
            TypeKind::SumType(variants)
        };
        out.push(TypeDefinition {
            name: result.to_owned(),
            kind,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::directive::{Placement, RefSlot};
    use crate::schema::parser::parse_schema;
    use crate::tag::Tag;

    fn compile_text(text: &str) -> SchemaResult<Vec<TypeDefinition>> {
        compile(&parse_schema(text)?, &CompileOptions::default())
    }

    #[test]
    fn record_directives_in_wire_order() {
        let defs = compile_text(
            "shard_ident$00 shard_pfx_bits:(#<= 60) workchain_id:int32 \
             shard_prefix:uint64 = ShardIdent;",
        )
        .unwrap();
        assert_eq!(defs.len(), 1);
        let TypeKind::Record(record) = &defs[0].kind else {
            panic!("expected record")
        };
        assert_eq!(record.tag, Some(Tag::new(0, 2)));
        let wires: Vec<_> = record.directives.iter().map(|d| d.wire.clone()).collect();
        assert_eq!(
            wires,
            vec![
                WireType::BoundedUint { bits: 6, max: 60 },
                WireType::Int(32),
                WireType::Uint(64)
            ]
        );
        assert_eq!(record.directives[2].ordinal, 2);
    }

    #[test]
    fn sum_type_and_forward_reference() {
        let defs = compile_text(
            "pair$_ a:Split b:^Split = Pair;\n\
             fsm_none$0 = Split;\n\
             fsm_split$10 split_utime:uint32 interval:uint32 = Split;\n\
             fsm_merge$11 merge_utime:uint32 interval:uint32 = Split;",
        )
        .unwrap();
        assert_eq!(defs[0].name, "Pair");
        let TypeKind::Record(pair) = &defs[0].kind else {
            panic!("expected record")
        };
        assert_eq!(pair.tag, None);
        assert_eq!(pair.directives[1].placement, Placement::ByRef(RefSlot::Next));
        assert_eq!(pair.directives[1].wire, WireType::named("Split"));
        let TypeKind::SumType(variants) = &defs[1].kind else {
            panic!("expected sum type")
        };
        let names: Vec<_> = variants.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["fsm_none", "fsm_split", "fsm_merge"]);
        assert_eq!(variants[2].tag, Tag::new(0b11, 2));
        assert_eq!(variants[1].record.directives.len(), 2);
    }

    #[test]
    fn generics_resolve() {
        let defs = compile_text(
            "a$_ x:(Maybe ^Cell) y:(Either Cell ^Cell) z:(Either Bool uint8) \
             m:(HashmapE 16 uint32) n:(VarUInteger 7) o:(#< 16) p:(## 9) \
             q:Coins = A;",
        )
        .unwrap();
        let TypeKind::Record(record) = &defs[0].kind else {
            panic!("expected record")
        };
        let wires: Vec<_> = record.directives.iter().map(|d| d.wire.clone()).collect();
        assert_eq!(
            wires,
            vec![
                WireType::Maybe(Box::new(WireType::Ref(Box::new(WireType::Any)))),
                WireType::EitherRef(Box::new(WireType::Any)),
                WireType::Either(Box::new(WireType::Bool), Box::new(WireType::Uint(8))),
                WireType::HashmapE {
                    key_bits: 16,
                    value: Box::new(WireType::Uint(32))
                },
                WireType::VarUInteger(7),
                WireType::BoundedUint { bits: 4, max: 15 },
                WireType::Uint(9),
                WireType::VarUInteger(16),
            ]
        );
    }

    #[test]
    fn skip_magic_only_affects_records() {
        let text = "a#cafe x:uint8 = A; b$0 = B; c$1 = B;";
        let opts = CompileOptions {
            skip_magic: true,
            ..CompileOptions::default()
        };
        let defs = compile(&parse_schema(text).unwrap(), &opts).unwrap();
        assert!(matches!(&defs[0].kind, TypeKind::Record(Record { tag: None, .. })));
        assert!(matches!(&defs[1].kind, TypeKind::SumType(v) if v[1].tag == Tag::new(1, 1)));
    }

    #[test]
    fn known_types_resolve_as_names() {
        let decls = parse_schema("msg$_ src:MsgAddress = Msg;").unwrap();
        assert!(matches!(
            compile(&decls, &CompileOptions::default()),
            Err(SchemaError::UnresolvedType { .. })
        ));
        let opts = CompileOptions::default().with_known_types(["MsgAddress"]);
        let defs = compile(&decls, &opts).unwrap();
        assert_eq!(defs[0].references(), vec!["MsgAddress"]);
    }

    #[test]
    fn failure_modes() {
        assert!(matches!(
            compile_text("hme_empty$0 {n:#} {X:Type} = HashmapE n X;"),
            Err(SchemaError::ParameterizedCombinator { .. })
        ));
        assert!(matches!(
            compile_text("a$_ x:Missing = A;"),
            Err(SchemaError::UnresolvedType { name, .. }) if name == "Missing"
        ));
        assert_eq!(
            compile_text("a$_ x:(Maybe uint8 uint8) = A;"),
            Err(SchemaError::WrongArity {
                name: "Maybe".into(),
                expected: 1,
                found: 2
            })
        );
        assert!(matches!(
            compile_text("a$_ x:(HashmapE n uint8) = A;"),
            Err(SchemaError::MissingNumericParameter { position: 0, .. })
        ));
        assert!(matches!(
            compile_text("a$0 = A; b = A;"),
            Err(SchemaError::MissingDiscriminator { constructor, .. }) if constructor == "b"
        ));
        assert!(matches!(
            compile_text("a$0 = A; b$01 = A;"),
            Err(SchemaError::AmbiguousTags { .. })
        ));
        assert!(matches!(
            compile_text("a$0 = A; a$1 = A;"),
            Err(SchemaError::DuplicateConstructor { .. })
        ));
        assert!(matches!(
            compile_text("a$_ f:(## 1) x:f?uint8 = A;"),
            Err(SchemaError::Unsupported { .. })
        ));
    }
}
