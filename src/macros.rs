#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a built-in whitelist [`TextPattern`](crate::TextPattern) from a static regex.
#[macro_export]
macro_rules! text_pattern {
    (name: $name:literal, pattern: $pat:literal $(,)?) => {
        $crate::TextPattern::from_static($name, $crate::regex!($pat))
    };
}
