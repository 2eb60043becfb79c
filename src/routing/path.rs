//! Legacy path syntax translation.
//!
//! Legacy patterns name parameters with a leading colon (`/users/:id`);
//! the engine expects braces (`/users/{id}`). Translation happens once, when
//! a route or filter is registered.

/// Rewrite every `:name` segment of a legacy pattern into `{name}`.
///
/// Only a colon that opens a path segment and is followed by at least one
/// character is treated as a parameter; colons elsewhere are literal text.
/// Wildcards and literal segments are copied unchanged.
///
/// ```
/// use spark_bridge::routing::translate;
///
/// assert_eq!(translate("/users/:id/posts/:postId"), "/users/{id}/posts/{postId}");
/// assert_eq!(translate("/time/12:30/*"), "/time/12:30/*");
/// ```
pub fn translate(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{}}}", name),
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
