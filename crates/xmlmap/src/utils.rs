//! Utility functions and constants shared by the registry and both engines.

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};

use crate::options::NameCase;

/// XML Schema instance namespace, home of the `nil` and `type` markers.
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Prefix always used for [`XSI_NAMESPACE`].
pub const XSI_PREFIX: &str = "xsi";

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Origin namespace of the built-in simple types.
pub const SYSTEM_ORIGIN: &str = "System";

/// Prefix reserved for system-style origin namespaces.
pub const SYSTEM_PREFIX: &str = "sys";

/// Applies a casing transform to a declared member name.
pub fn apply_case(name: &str, case: NameCase) -> String {
    match case {
        NameCase::AsDeclared => name.to_string(),
        NameCase::Camel => name.to_lower_camel_case(),
        NameCase::Pascal => name.to_upper_camel_case(),
        NameCase::Snake => name.to_snake_case(),
        NameCase::Kebab => name.to_kebab_case(),
    }
}

/// Capitalizes the first character (`string` -> `String`).
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Checks if a text node holds only XML whitespace.
pub fn is_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\n' | '\r' | '\t'))
}

/// Returns the namespace with its last segment removed, splitting on `/`,
/// `.` or `:` (`http://acme.com/shapes/v2` -> `http://acme.com/shapes`).
pub fn truncate_namespace(namespace: &str) -> Option<&str> {
    let trimmed = namespace.trim_end_matches(['/', '.', ':']);
    let cut = trimmed.rfind(['/', '.', ':'])?;
    let shorter = trimmed[..cut].trim_end_matches(['/', '.', ':']);
    if shorter.is_empty() {
        None
    } else {
        Some(shorter)
    }
}

/// Checks if a prefix is reserved by the XML namespaces recommendation.
pub fn is_reserved_prefix(prefix: &str) -> bool {
    prefix
        .get(..3)
        .is_some_and(|head| head.eq_ignore_ascii_case("xml"))
}
