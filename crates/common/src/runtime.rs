//! Names of the C# runtime support library that woven code compiles against.
//!
//! The weaver never loads this library; it only emits references to it.

/// Namespace of the runtime support types.
pub const RUNTIME_NAMESPACE: &str = "Loom.Abstractions";

/// Base class every interception attribute derives from.
pub const BASE_ATTRIBUTE: &str = "LoomAttribute";

/// Marker attribute attached to renamed methods, one per matched attribute.
pub const MARKER_ATTRIBUTE: &str = "LoomMarker";

/// Stand-in type used where a method type parameter cannot be named statically.
pub const GENERIC_PLACEHOLDER: &str = "GenericPlaceholder";

/// Inserted before the extension of a source path to name its companion file.
pub const COMPANION_MARKER: &str = "Companion";

/// Trailing name segment of the obsolescence attribute.
pub const OBSOLETE_ATTRIBUTE: &str = "Obsolete";

/// Fully qualified marker attribute reference, safe to emit in any file.
pub fn qualified_marker() -> String {
    format!("{RUNTIME_NAMESPACE}.{MARKER_ATTRIBUTE}")
}
