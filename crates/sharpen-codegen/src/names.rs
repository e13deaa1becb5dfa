//! C# identifier and literal spelling.

/// C# reserved keywords; identifiers colliding with them get an `@` prefix.
const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char",
    "checked", "class", "const", "continue", "decimal", "default", "delegate",
    "do", "double", "else", "enum", "event", "explicit", "extern", "false",
    "finally", "fixed", "float", "for", "foreach", "goto", "if", "implicit",
    "in", "int", "interface", "internal", "is", "lock", "long", "namespace",
    "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte",
    "sealed", "short", "sizeof", "stackalloc", "static", "string", "struct",
    "switch", "this", "throw", "true", "try", "typeof", "uint", "ulong",
    "unchecked", "unsafe", "ushort", "using", "virtual", "void", "volatile",
    "while",
];

/// Escape a native identifier so it is a valid C# identifier.
pub fn escape_identifier(name: &str) -> String {
    if is_operator_name(name) {
        return operator_name(name);
    }
    if CSHARP_KEYWORDS.contains(&name) {
        format!("@{}", name)
    } else {
        name.to_string()
    }
}

/// `operator==`, `operator int`; not `operatorCount`.
fn is_operator_name(name: &str) -> bool {
    match name.strip_prefix("operator").and_then(|rest| rest.chars().next()) {
        Some(next) => !(next.is_alphanumeric() || next == '_'),
        None => false,
    }
}

/// Overloaded operators become named methods.
fn operator_name(name: &str) -> String {
    let symbol = name["operator".len()..].trim();
    let mapped = match symbol {
        "=" => "Assign",
        "==" => "Equals",
        "!=" => "NotEquals",
        "<" => "LessThan",
        "<=" => "LessThanOrEqual",
        ">" => "GreaterThan",
        ">=" => "GreaterThanOrEqual",
        "+" => "Add",
        "-" => "Subtract",
        "*" => "Multiply",
        "/" => "Divide",
        "%" => "Modulus",
        "[]" => "Subscript",
        "()" => "Call",
        "+=" => "AddAssign",
        "-=" => "SubtractAssign",
        "!" => "Not",
        "~" => "OnesComplement",
        "++" => "Increment",
        "--" => "Decrement",
        "<<" => "LeftShift",
        ">>" => "RightShift",
        _ => {
            let cleaned: String = symbol
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            let cleaned = cleaned.trim_matches('_');
            if cleaned.is_empty() {
                return "op_Operator".to_string();
            }
            return format!("op_{}", cleaned);
        }
    };
    format!("op_{}", mapped)
}

/// Spell `value` as a C# regular string literal, quotes included.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Spell a code point as a C# character literal, quotes included.
pub fn char_literal(value: u32) -> String {
    match char::from_u32(value) {
        Some('\'') => "'\\''".to_string(),
        Some('\\') => "'\\\\'".to_string(),
        Some('\n') => "'\\n'".to_string(),
        Some('\r') => "'\\r'".to_string(),
        Some('\t') => "'\\t'".to_string(),
        Some('\0') => "'\\0'".to_string(),
        Some(c) if c.is_ascii_graphic() || c == ' ' => format!("'{}'", c),
        _ => format!("'\\u{:04X}'", value & 0xFFFF),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_escaped() {
        assert_eq!(escape_identifier("value"), "value");
        assert_eq!(escape_identifier("base"), "@base");
        assert_eq!(escape_identifier("string"), "@string");
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(escape_identifier("operator=="), "op_Equals");
        assert_eq!(escape_identifier("operator[]"), "op_Subscript");
        assert_eq!(escape_identifier("operator<<"), "op_LeftShift");
        assert_eq!(escape_identifier("operator->*"), "op_Operator");
        assert_eq!(escape_identifier("operator"), "@operator");
        assert_eq!(escape_identifier("operator bool"), "op_bool");
    }

    #[test]
    fn test_identifiers_starting_with_operator_are_kept() {
        assert_eq!(escape_identifier("operatorCount"), "operatorCount");
        assert_eq!(escape_identifier("operator_table"), "operator_table");
        assert_eq!(escape_identifier("operators"), "operators");
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal("This is obsolete."), "\"This is obsolete.\"");
        assert_eq!(string_literal("a \"b\"\n"), "\"a \\\"b\\\"\\n\"");
    }

    #[test]
    fn test_char_literal() {
        assert_eq!(char_literal('a' as u32), "'a'");
        assert_eq!(char_literal('\'' as u32), "'\\''");
        assert_eq!(char_literal(7), "'\\u0007'");
    }
}
