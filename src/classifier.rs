//! Content-type classification by file extension
//!
//! The extension table is stable data: other components may read
//! [`CONTENT_TYPES`] directly to list the labels a stored file can carry.

use std::path::Path;

/// Label assigned when the extension is missing or unknown
pub const PLAINTEXT_LABEL: &str = "plaintext";

/// Extension (lowercase, without dot) to content-type label
pub const CONTENT_TYPES: &[(&str, &str)] = &[
    // Source
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("rs", "rust"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("scala", "scala"),
    ("swift", "swift"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("lua", "lua"),
    ("r", "r"),
    ("dart", "dart"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("hs", "haskell"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    // Markup and styles
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("sass", "scss"),
    ("less", "less"),
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("rst", "restructuredtext"),
    ("tex", "latex"),
    // Data
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("csv", "csv"),
    ("sql", "sql"),
    ("graphql", "graphql"),
    ("proto", "protobuf"),
    ("ini", "ini"),
    ("cfg", "ini"),
    // Shell
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("fish", "shell"),
    ("ps1", "powershell"),
    ("bat", "batch"),
    ("dockerfile", "dockerfile"),
];

/// Classify a file by the extension of its name.
///
/// Total over all inputs; unknown or missing extensions yield [`PLAINTEXT_LABEL`].
pub fn classify(file_name: &str) -> &'static str {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(label_for_extension)
        .unwrap_or(PLAINTEXT_LABEL)
}

/// Look up the label for a bare extension, ignoring ASCII case
pub fn label_for_extension(extension: &str) -> Option<&'static str> {
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, label)| *label)
}
