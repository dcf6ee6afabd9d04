//! Path tokenization
//!
//! Pure functions over borrowed path strings; no allocation, no I/O. The
//! resolver and the leaf-name extraction both tokenize through
//! [`components`], so the two can never disagree about where a component
//! begins and ends.

/// Path component separator.
pub const SEPARATOR: char = '/';

/// Splits a path into its non-empty components.
///
/// Consecutive separators produce no empty components; a leading or trailing
/// separator is likewise invisible here (whether a path is absolute is a
/// separate question, see [`is_absolute`]).
///
/// # Examples
///
/// ```
/// use filesys::path::components;
///
/// let parts: Vec<&str> = components("/docs//notes/todo.txt").collect();
/// assert_eq!(parts, vec!["docs", "notes", "todo.txt"]);
///
/// assert_eq!(components("///").count(), 0);
/// ```
pub fn components(path: &str) -> impl Iterator<Item = &str> + Clone {
    path.split(SEPARATOR).filter(|component| !component.is_empty())
}

/// Extracts the final path component, or `""` when the path has none.
///
/// # Examples
///
/// ```
/// use filesys::path::leaf_name;
///
/// assert_eq!(leaf_name("/docs/todo.txt"), "todo.txt");
/// assert_eq!(leaf_name("todo.txt"), "todo.txt");
/// assert_eq!(leaf_name("/"), "");
/// ```
pub fn leaf_name(path: &str) -> &str {
    components(path).last().unwrap_or("")
}

/// Whether resolution of this path starts at the tree root.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// "." and ".." are resolved structurally and can never be created.
pub fn is_reserved_name(name: &str) -> bool {
    name == "." || name == ".."
}
