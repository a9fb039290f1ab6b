//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! YANG type descriptors and typed values.
//!
//! A [`TypeDef`] is the fully resolved form of a `type` statement: the
//! typedef chain is collapsed at schema compile time, with ranges
//! intersected, patterns accumulated and enum/bits sets restricted along
//! the way. [`store_value`] is the single lexical-to-typed entry point
//! used by data parsers, default materialisation and the XPath engine, so
//! canonicalisation is bit-stable across callers.

use base64::prelude::*;
use num_traits::FromPrimitive;
use smallvec::SmallVec;

use crate::arena::{Id, Sym};
use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::schema::{DataValue, DataValueType, IdentityId, ModuleId, SnodeId};
use crate::xpath::XPathExpr;

pub(crate) type TypeId = Id<TypeDef>;

/// Fully resolved type descriptor.
#[derive(Clone, Debug)]
pub(crate) struct TypeDef {
    /// Typedef name, if this type was derived through a typedef.
    pub name: Option<(ModuleId, Sym)>,
    pub spec: TypeSpec,
    /// Default inherited down the typedef chain, as its lexical form.
    pub default_lexical: Option<Sym>,
    /// Units inherited down the typedef chain.
    pub units: Option<Sym>,
}

/// Kind-specific payload of a resolved type.
#[derive(Clone, Debug)]
pub(crate) enum TypeSpec {
    Int {
        /// 8, 16, 32 or 64.
        width: u8,
        range: Ranges<i64>,
    },
    Uint {
        width: u8,
        range: Ranges<u64>,
    },
    Decimal64 {
        fraction_digits: u8,
        /// Range bounds scaled by 10^fraction-digits.
        range: Ranges<i64>,
    },
    String {
        /// Length ranges, in characters.
        length: Ranges<u64>,
        /// Cumulative pattern chain, outermost restriction last.
        patterns: Vec<PatternSpec>,
    },
    Boolean,
    Enumeration {
        enums: Vec<(Sym, i32)>,
    },
    Bits {
        bits: Vec<(Sym, u32)>,
    },
    Binary {
        /// Length ranges, in decoded octets.
        length: Ranges<u64>,
    },
    Leafref {
        path: Box<XPathExpr>,
        path_module: ModuleId,
        require_instance: bool,
        /// Resolved by the schema resolver (pass 8).
        target: Option<SnodeId>,
        /// First non-leafref type in the chain, resolved with the target.
        real_type: Option<TypeId>,
    },
    Identityref {
        bases: Vec<IdentityId>,
    },
    InstanceIdentifier {
        require_instance: bool,
    },
    Empty,
    Union {
        members: Vec<TypeId>,
    },
    /// Plugin-backed type; the key addresses the context registry.
    UserDefined {
        module: Sym,
        name: Sym,
        revision: Option<Sym>,
    },
}

/// A set of inclusive ranges. Empty means unconstrained.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Ranges<T>(pub SmallVec<[(T, T); 1]>);

/// One compiled pattern restriction.
#[derive(Clone, Debug)]
pub(crate) struct PatternSpec {
    pub regex: regex::Regex,
    pub source: Sym,
    pub invert: bool,
}

/// A typed value together with its canonical lexical form.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StoredValue {
    pub value: DataValue,
    pub canonical: String,
}

// ===== impl TypeDef =====

impl TypeDef {
    /// The resolved base type tag.
    pub(crate) fn base(&self) -> DataValueType {
        match &self.spec {
            TypeSpec::Int { width: 8, .. } => DataValueType::Int8,
            TypeSpec::Int { width: 16, .. } => DataValueType::Int16,
            TypeSpec::Int { width: 32, .. } => DataValueType::Int32,
            TypeSpec::Int { .. } => DataValueType::Int64,
            TypeSpec::Uint { width: 8, .. } => DataValueType::Uint8,
            TypeSpec::Uint { width: 16, .. } => DataValueType::Uint16,
            TypeSpec::Uint { width: 32, .. } => DataValueType::Uint32,
            TypeSpec::Uint { .. } => DataValueType::Uint64,
            TypeSpec::Decimal64 { .. } => DataValueType::Dec64,
            TypeSpec::String { .. } => DataValueType::String,
            TypeSpec::Boolean => DataValueType::Bool,
            TypeSpec::Enumeration { .. } => DataValueType::Enum,
            TypeSpec::Bits { .. } => DataValueType::Bits,
            TypeSpec::Binary { .. } => DataValueType::Binary,
            TypeSpec::Leafref { .. } => DataValueType::LeafRef,
            TypeSpec::Identityref { .. } => DataValueType::IdentityRef,
            TypeSpec::InstanceIdentifier { .. } => DataValueType::InstanceId,
            TypeSpec::Empty => DataValueType::Empty,
            TypeSpec::Union { .. } => DataValueType::Union,
            TypeSpec::UserDefined { .. } => DataValueType::Unknown,
        }
    }
}

// ===== impl Ranges =====

impl<T: Copy + PartialOrd> Ranges<T> {
    pub(crate) fn unconstrained() -> Ranges<T> {
        Ranges(SmallVec::new())
    }

    pub(crate) fn is_unconstrained(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn contains(&self, value: T) -> bool {
        if self.0.is_empty() {
            return true;
        }
        self.0.iter().any(|(lo, hi)| *lo <= value && value <= *hi)
    }

    /// Restrict `self` by a derived range. The derived range must lie
    /// within the base range (checked by the resolver before calling).
    pub(crate) fn restrict(&self, derived: Ranges<T>) -> Ranges<T> {
        if derived.0.is_empty() {
            self.clone()
        } else {
            derived
        }
    }

    /// True if every point of `derived` is covered by `self`.
    pub(crate) fn covers(&self, derived: &Ranges<T>) -> bool {
        derived
            .0
            .iter()
            .all(|(lo, hi)| self.contains(*lo) && self.contains(*hi))
    }

    pub(crate) fn min(&self) -> Option<T> {
        self.0.first().map(|(lo, _)| *lo)
    }

    pub(crate) fn max(&self) -> Option<T> {
        self.0.last().map(|(_, hi)| *hi)
    }
}

impl<T: Copy + PartialOrd> FromIterator<(T, T)> for Ranges<T> {
    fn from_iter<I: IntoIterator<Item = (T, T)>>(iter: I) -> Ranges<T> {
        Ranges(iter.into_iter().collect())
    }
}

// ===== lexical parsing helpers =====

/// Parse a YANG integer lexical (decimal, octal with a leading zero, or
/// hexadecimal with an `0x`/`0X` prefix) into a wide integer.
pub(crate) fn parse_int_lexical(lexical: &str) -> Result<i128> {
    let s = lexical.trim();
    if s.is_empty() {
        return Err(Error::new(ErrorKind::TypeMismatch, "empty integer value"));
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, digits) = if let Some(hex) =
        digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    let magnitude = i128::from_str_radix(digits, radix).map_err(|_| {
        Error::new(
            ErrorKind::TypeMismatch,
            format!("invalid integer value \"{}\"", lexical),
        )
    })?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Parse a decimal64 lexical into its scaled integer representation.
pub(crate) fn parse_decimal64(lexical: &str, fraction_digits: u8) -> Result<i64> {
    let s = lexical.trim();
    let err = || {
        Error::new(
            ErrorKind::TypeMismatch,
            format!("invalid decimal64 value \"{}\"", s),
        )
    };
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
        || frac_part.len() > fraction_digits as usize
    {
        return Err(err());
    }
    let mut scaled: i128 = int_part.parse::<i128>().map_err(|_| err())?;
    scaled = scaled.checked_mul(10i128.pow(fraction_digits as u32)).ok_or_else(err)?;
    if !frac_part.is_empty() {
        let frac: i128 = frac_part.parse().map_err(|_| err())?;
        scaled += frac * 10i128.pow((fraction_digits as usize - frac_part.len()) as u32);
    }
    if negative {
        scaled = -scaled;
    }
    i64::from_i128(scaled).ok_or_else(err)
}

/// Render a scaled decimal64 in canonical form: no superfluous leading
/// zeros, at least one fraction digit, no trailing fraction zeros beyond
/// the first.
pub(crate) fn format_decimal64(scaled: i64, fraction_digits: u8) -> String {
    let negative = scaled < 0;
    let magnitude = (scaled as i128).unsigned_abs();
    let divisor = 10u128.pow(fraction_digits as u32);
    let int_part = magnitude / divisor;
    let mut frac_part = format!(
        "{:0width$}",
        magnitude % divisor,
        width = fraction_digits as usize
    );
    while frac_part.len() > 1 && frac_part.ends_with('0') {
        frac_part.pop();
    }
    if negative {
        format!("-{}.{}", int_part, frac_part)
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Decode a base64 lexical, ignoring embedded whitespace as XSD does.
pub(crate) fn decode_base64(lexical: &str) -> Result<Vec<u8>> {
    let stripped: String =
        lexical.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD
        .decode(stripped)
        .map_err(|_| Error::new(ErrorKind::TypeMismatch, "invalid base64 value"))
}

fn encode_base64(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Translate the YANG subset of XSD regular expressions into the syntax
/// of the `regex` crate and anchor it (XSD patterns match the whole
/// value).
pub(crate) fn xsd_regex_to_rust(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?:");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            // XML initial-name-character and name-character classes.
            Some('i') => out.push_str("[A-Za-z_:]"),
            Some('I') => out.push_str("[^A-Za-z_:]"),
            Some('c') => out.push_str("[-A-Za-z0-9._:]"),
            Some('C') => out.push_str("[^-A-Za-z0-9._:]"),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out.push_str(")$");
    out
}

// ===== store_value =====

fn type_error(type_name: &str, lexical: &str) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        format!("invalid {} value \"{}\"", type_name, lexical),
    )
}

fn store_int(width: u8, range: &Ranges<i64>, lexical: &str) -> Result<StoredValue> {
    let wide = parse_int_lexical(lexical)?;
    let (min, max) = match width {
        8 => (i8::MIN as i128, i8::MAX as i128),
        16 => (i16::MIN as i128, i16::MAX as i128),
        32 => (i32::MIN as i128, i32::MAX as i128),
        _ => (i64::MIN as i128, i64::MAX as i128),
    };
    if wide < min || wide > max || !range.contains(wide as i64) {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("value \"{}\" is out of range", lexical.trim()),
        ));
    }
    let value = match width {
        8 => DataValue::Int8(wide as i8),
        16 => DataValue::Int16(wide as i16),
        32 => DataValue::Int32(wide as i32),
        _ => DataValue::Int64(wide as i64),
    };
    Ok(StoredValue {
        canonical: wide.to_string(),
        value,
    })
}

fn store_uint(width: u8, range: &Ranges<u64>, lexical: &str) -> Result<StoredValue> {
    let wide = parse_int_lexical(lexical)?;
    let max = match width {
        8 => u8::MAX as i128,
        16 => u16::MAX as i128,
        32 => u32::MAX as i128,
        _ => u64::MAX as i128,
    };
    if wide < 0 || wide > max || !range.contains(wide as u64) {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("value \"{}\" is out of range", lexical.trim()),
        ));
    }
    let value = match width {
        8 => DataValue::Uint8(wide as u8),
        16 => DataValue::Uint16(wide as u16),
        32 => DataValue::Uint32(wide as u32),
        _ => DataValue::Uint64(wide as u64),
    };
    Ok(StoredValue {
        canonical: wide.to_string(),
        value,
    })
}

/// Parse a lexical value against a resolved type, canonicalise it and
/// check the full constraint chain. This is the `store-value` primitive
/// of the data-parser interface.
pub(crate) fn store_value(
    ctx: &Context,
    local_module: ModuleId,
    ty: TypeId,
    lexical: &str,
) -> Result<StoredValue> {
    let tdef = &ctx.types[ty];
    match &tdef.spec {
        TypeSpec::Int { width, range } => store_int(*width, range, lexical),
        TypeSpec::Uint { width, range } => store_uint(*width, range, lexical),
        TypeSpec::Decimal64 {
            fraction_digits,
            range,
        } => {
            let scaled = parse_decimal64(lexical, *fraction_digits)?;
            if !range.contains(scaled) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!("value \"{}\" is out of range", lexical.trim()),
                ));
            }
            let canonical = format_decimal64(scaled, *fraction_digits);
            Ok(StoredValue {
                value: DataValue::Other(canonical.clone()),
                canonical,
            })
        }
        TypeSpec::String { length, patterns } => {
            let chars = lexical.chars().count() as u64;
            if !length.contains(chars) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    "string length constraint violated",
                ));
            }
            for pattern in patterns {
                if pattern.regex.is_match(lexical) == pattern.invert {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!(
                            "string \"{}\" does not match pattern \"{}\"",
                            lexical,
                            ctx.resolve(pattern.source)
                        ),
                    ));
                }
            }
            Ok(StoredValue {
                value: DataValue::Other(lexical.to_string()),
                canonical: lexical.to_string(),
            })
        }
        TypeSpec::Boolean => match lexical.trim() {
            "true" => Ok(StoredValue {
                value: DataValue::Bool(true),
                canonical: "true".to_string(),
            }),
            "false" => Ok(StoredValue {
                value: DataValue::Bool(false),
                canonical: "false".to_string(),
            }),
            _ => Err(type_error("boolean", lexical)),
        },
        TypeSpec::Enumeration { enums } => {
            let name = lexical.trim();
            match enums.iter().find(|(sym, _)| ctx.resolve(*sym) == name) {
                Some(_) => Ok(StoredValue {
                    value: DataValue::Other(name.to_string()),
                    canonical: name.to_string(),
                }),
                None => Err(Error::new(
                    ErrorKind::InvalidEnum,
                    format!("invalid enumeration value \"{}\"", name),
                )),
            }
        }
        TypeSpec::Bits { bits } => {
            let mut set: Vec<(u32, Sym)> = Vec::new();
            for word in lexical.split_whitespace() {
                let bit = bits
                    .iter()
                    .find(|(sym, _)| ctx.resolve(*sym) == word)
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::InvalidEnum,
                            format!("invalid bit name \"{}\"", word),
                        )
                    })?;
                if !set.iter().any(|(_, sym)| *sym == bit.0) {
                    set.push((bit.1, bit.0));
                }
            }
            // Canonical order is by bit position.
            set.sort_by_key(|(pos, _)| *pos);
            let canonical = set
                .iter()
                .map(|(_, sym)| ctx.resolve(*sym))
                .collect::<Vec<_>>()
                .join(" ");
            Ok(StoredValue {
                value: DataValue::Other(canonical.clone()),
                canonical,
            })
        }
        TypeSpec::Binary { length } => {
            let decoded = decode_base64(lexical)?;
            if !length.contains(decoded.len() as u64) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    "binary length constraint violated",
                ));
            }
            let canonical = encode_base64(&decoded);
            Ok(StoredValue {
                value: DataValue::Other(canonical.clone()),
                canonical,
            })
        }
        TypeSpec::Leafref { real_type, .. } => {
            // Value space of a leafref is the value space of its target;
            // instance existence is checked by the validator.
            match real_type {
                Some(real) => store_value(ctx, local_module, *real, lexical),
                None => Ok(StoredValue {
                    value: DataValue::Other(lexical.to_string()),
                    canonical: lexical.to_string(),
                }),
            }
        }
        TypeSpec::Identityref { bases } => {
            let name = lexical.trim();
            let identity = ctx.find_identity(local_module, name).ok_or_else(
                || {
                    Error::new(
                        ErrorKind::InvalidEnum,
                        format!("unknown identity \"{}\"", name),
                    )
                },
            )?;
            let derived = bases.iter().any(|base| {
                *base == identity
                    || ctx.identities[*base].derived.contains(&identity)
            });
            if !derived {
                return Err(Error::new(
                    ErrorKind::IdentityNotDerived,
                    format!(
                        "identity \"{}\" is not derived from a permitted base",
                        name
                    ),
                ));
            }
            let ident = &ctx.identities[identity];
            let canonical = format!(
                "{}:{}",
                ctx.resolve(ctx.modules[ident.module].name),
                ctx.resolve(ident.name)
            );
            Ok(StoredValue {
                value: DataValue::Other(canonical.clone()),
                canonical,
            })
        }
        TypeSpec::InstanceIdentifier { .. } => {
            let path = lexical.trim();
            if !path.starts_with('/') {
                return Err(type_error("instance-identifier", lexical));
            }
            Ok(StoredValue {
                value: DataValue::Other(path.to_string()),
                canonical: path.to_string(),
            })
        }
        TypeSpec::Empty => {
            if !lexical.is_empty() {
                return Err(type_error("empty", lexical));
            }
            Ok(StoredValue {
                value: DataValue::Empty,
                canonical: String::new(),
            })
        }
        TypeSpec::Union { members } => {
            // First member type that accepts the value wins.
            for member in members {
                if let Ok(stored) =
                    store_value(ctx, local_module, *member, lexical)
                {
                    return Ok(stored);
                }
            }
            Err(Error::new(
                ErrorKind::TypeMismatch,
                format!("value \"{}\" matches no union member type", lexical),
            ))
        }
        TypeSpec::UserDefined {
            module,
            name,
            revision,
        } => {
            let plugin = ctx
                .user_type_plugin(*module, *name, *revision)
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::Other,
                        format!(
                            "no plugin registered for type \"{}\"",
                            ctx.resolve(*name)
                        ),
                    )
                })?;
            let canonical = (plugin.store)(lexical).map_err(|msg| {
                Error::new(ErrorKind::TypeMismatch, msg)
            })?;
            Ok(StoredValue {
                value: DataValue::Other(canonical.clone()),
                canonical,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_lexicals() {
        assert_eq!(parse_int_lexical("42").unwrap(), 42);
        assert_eq!(parse_int_lexical("-42").unwrap(), -42);
        assert_eq!(parse_int_lexical("0x2A").unwrap(), 42);
        assert_eq!(parse_int_lexical("052").unwrap(), 42);
        assert!(parse_int_lexical("4x2").is_err());
    }

    #[test]
    fn decimal64_scaling() {
        assert_eq!(parse_decimal64("3.14", 2).unwrap(), 314);
        assert_eq!(parse_decimal64("-1.5", 2).unwrap(), -150);
        assert_eq!(parse_decimal64("7", 2).unwrap(), 700);
        assert!(parse_decimal64("3.141", 2).is_err());
        assert_eq!(format_decimal64(314, 2), "3.14");
        assert_eq!(format_decimal64(-150, 2), "-1.5");
        assert_eq!(format_decimal64(700, 2), "7.0");
    }

    #[test]
    fn decimal64_roundtrip() {
        for lexical in ["0.0", "1.5", "-2.25", "100.0"] {
            let scaled = parse_decimal64(lexical, 2).unwrap();
            let canonical = format_decimal64(scaled, 2);
            assert_eq!(parse_decimal64(&canonical, 2).unwrap(), scaled);
        }
    }

    #[test]
    fn base64_roundtrip() {
        let decoded = decode_base64("aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
        assert_eq!(encode_base64(&decoded), "aGVsbG8=");
        assert_eq!(decode_base64("").unwrap(), Vec::<u8>::new());
        assert!(decode_base64("a").is_err());
    }

    #[test]
    fn xsd_translation() {
        assert_eq!(xsd_regex_to_rust("[0-9]+"), "^(?:[0-9]+)$");
        assert_eq!(xsd_regex_to_rust(r"\d{3}"), r"^(?:\d{3})$");
        assert_eq!(xsd_regex_to_rust(r"\i"), "^(?:[A-Za-z_:])$");
    }

    #[test]
    fn ranges() {
        let r: Ranges<i64> = [(1, 10), (20, 30)].into_iter().collect();
        assert!(r.contains(5));
        assert!(r.contains(20));
        assert!(!r.contains(15));
        assert!(Ranges::<i64>::unconstrained().contains(i64::MAX));
        assert!(r.covers(&[(2, 3)].into_iter().collect()));
        assert!(!r.covers(&[(2, 15)].into_iter().collect()));
    }
}
