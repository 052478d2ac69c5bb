//! Language detection and semantic boundary markers.

use std::path::Path;
use std::sync::LazyLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// Language inferred from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    Java,
    Cpp,
    C,
    CSharp,
    Php,
    Ruby,
    Go,
    Rust,
    Swift,
    Kotlin,
    Scala,
    Markdown,
    Text,
    Json,
    Yaml,
    Unknown,
}

/// Boundary markers used by the chunker to pick split points.
#[derive(Debug, Clone, Copy)]
pub enum Markers {
    /// Line patterns that open a new semantic unit (function, class, ...).
    Semantic(&'static RegexSet),
    /// No markers known: split into fixed windows.
    PlainText,
}

static PYTHON: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*def\s+",
        r"^\s*async\s+def\s+",
        r"^\s*class\s+",
        r"^\s*@\w+",
        r"^\s*if\s+__name__",
    ])
    .unwrap()
});

static JAVASCRIPT: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(async\s+)?function\s+",
        r"^\s*class\s+",
        r"^\s*const\s+\w+\s*=\s*(async\s*)?\(",
        r"^\s*export\s+",
    ])
    .unwrap()
});

static TYPESCRIPT: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(async\s+)?function\s+",
        r"^\s*(abstract\s+)?class\s+",
        r"^\s*interface\s+",
        r"^\s*type\s+",
        r"^\s*export\s+",
    ])
    .unwrap()
});

static JAVA: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*public\s+class\s+",
        r"^\s*private\s+\w+",
        r"^\s*public\s+\w+",
        r"^\s*@\w+",
    ])
    .unwrap()
});

static CPP: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*class\s+",
        r"^\s*struct\s+",
        r"^\s*\w+\s*::\s*",
        r"^\s*template\s*<",
    ])
    .unwrap()
});

static C_LANG: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*\w+\s+\w+\s*\(",
        r"^\s*struct\s+",
        r"^\s*typedef\s+",
        r"^\s*#define\s+",
    ])
    .unwrap()
});

static CSHARP: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(public|private|protected|internal)\s+",
        r"^\s*(class|interface|struct|enum|record)\s+",
        r"^\s*namespace\s+",
        r"^\s*\[\w+",
    ])
    .unwrap()
});

static PHP: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*((public|private|protected|static|abstract|final)\s+)*function\s+",
        r"^\s*((abstract|final)\s+)?class\s+",
        r"^\s*(interface|trait)\s+",
    ])
    .unwrap()
});

static RUBY: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"^\s*def\s+", r"^\s*class\s+", r"^\s*module\s+"]).unwrap()
});

static GO: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"^func\s+", r"^type\s+", r"^(const|var)\s+\("]).unwrap()
});

static RUST: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*(pub(\([^)]*\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?(extern\s+\S+\s+)?fn\s+",
        r"^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait|union|mod|type)\s+",
        r"^\s*(unsafe\s+)?impl\b",
        r"^\s*macro_rules!",
        r"^\s*#\[",
    ])
    .unwrap()
});

static SWIFT: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*((public|private|internal|fileprivate|open|static|final)\s+)*(func|class|struct|enum|protocol|extension)\s+",
        r"^\s*@\w+",
    ])
    .unwrap()
});

static KOTLIN: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*((public|private|protected|internal|override|open|abstract|suspend|data|sealed|inline)\s+)*(fun|class|object|interface)\s+",
        r"^\s*@\w+",
    ])
    .unwrap()
});

static SCALA: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^\s*((private|protected|override|final|sealed|implicit|abstract)\s+)*(def|class|object|trait)\s+",
        r"^\s*case\s+class\s+",
    ])
    .unwrap()
});

impl Lang {
    /// Identifier stored alongside file and chunk records.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::CSharp => "csharp",
            Self::Php => "php",
            Self::Ruby => "ruby",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Java => "Java",
            Self::Cpp => "C++",
            Self::C => "C",
            Self::CSharp => "C#",
            Self::Php => "PHP",
            Self::Ruby => "Ruby",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::Swift => "Swift",
            Self::Kotlin => "Kotlin",
            Self::Scala => "Scala",
            Self::Markdown => "Markdown",
            Self::Text => "Text",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse an identifier produced by [`Lang::id`]. Unrecognized ids map to
    /// [`Lang::Unknown`].
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        match id {
            "python" => Self::Python,
            "javascript" => Self::JavaScript,
            "typescript" => Self::TypeScript,
            "java" => Self::Java,
            "cpp" => Self::Cpp,
            "c" => Self::C,
            "csharp" => Self::CSharp,
            "php" => Self::Php,
            "ruby" => Self::Ruby,
            "go" => Self::Go,
            "rust" => Self::Rust,
            "swift" => Self::Swift,
            "kotlin" => Self::Kotlin,
            "scala" => Self::Scala,
            "markdown" => Self::Markdown,
            "text" => Self::Text,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            _ => Self::Unknown,
        }
    }

    /// Line patterns marking semantic boundaries in this language.
    #[must_use]
    pub fn boundary_markers(self) -> Markers {
        let set: &'static RegexSet = match self {
            Self::Python => &*PYTHON,
            Self::JavaScript => &*JAVASCRIPT,
            Self::TypeScript => &*TYPESCRIPT,
            Self::Java => &*JAVA,
            Self::Cpp => &*CPP,
            Self::C => &*C_LANG,
            Self::CSharp => &*CSHARP,
            Self::Php => &*PHP,
            Self::Ruby => &*RUBY,
            Self::Go => &*GO,
            Self::Rust => &*RUST,
            Self::Swift => &*SWIFT,
            Self::Kotlin => &*KOTLIN,
            Self::Scala => &*SCALA,
            Self::Markdown | Self::Text | Self::Json | Self::Yaml | Self::Unknown => {
                return Markers::PlainText;
            }
        };
        Markers::Semantic(set)
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Markers {
    /// Whether `line` opens a new semantic unit. Always false for plain text.
    #[must_use]
    pub fn is_boundary(&self, line: &str) -> bool {
        match self {
            Self::Semantic(set) => set.is_match(line.trim_end_matches(['\n', '\r'])),
            Self::PlainText => false,
        }
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Lang {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Lang::Unknown;
    };
    match ext.to_ascii_lowercase().as_str() {
        "py" | "pyi" => Lang::Python,
        "js" | "jsx" | "mjs" | "cjs" => Lang::JavaScript,
        "ts" | "tsx" | "mts" | "cts" => Lang::TypeScript,
        "java" => Lang::Java,
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => Lang::Cpp,
        "c" | "h" => Lang::C,
        "cs" => Lang::CSharp,
        "php" => Lang::Php,
        "rb" => Lang::Ruby,
        "go" => Lang::Go,
        "rs" => Lang::Rust,
        "swift" => Lang::Swift,
        "kt" | "kts" => Lang::Kotlin,
        "scala" | "sc" => Lang::Scala,
        "md" | "markdown" => Lang::Markdown,
        "txt" => Lang::Text,
        "json" | "jsonc" => Lang::Json,
        "yml" | "yaml" => Lang::Yaml,
        _ => Lang::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Lang; 19] = [
        Lang::Python,
        Lang::JavaScript,
        Lang::TypeScript,
        Lang::Java,
        Lang::Cpp,
        Lang::C,
        Lang::CSharp,
        Lang::Php,
        Lang::Ruby,
        Lang::Go,
        Lang::Rust,
        Lang::Swift,
        Lang::Kotlin,
        Lang::Scala,
        Lang::Markdown,
        Lang::Text,
        Lang::Json,
        Lang::Yaml,
        Lang::Unknown,
    ];

    #[test]
    fn detect_language_py() {
        assert_eq!(detect_language(Path::new("app/auth.py")), Lang::Python);
    }

    #[test]
    fn detect_language_is_case_insensitive() {
        assert_eq!(detect_language(Path::new("Main.JAVA")), Lang::Java);
        assert_eq!(detect_language(Path::new("lib.RS")), Lang::Rust);
    }

    #[test]
    fn detect_language_headers() {
        assert_eq!(detect_language(Path::new("x.h")), Lang::C);
        assert_eq!(detect_language(Path::new("x.hpp")), Lang::Cpp);
    }

    #[test]
    fn detect_language_unknown() {
        assert_eq!(detect_language(Path::new("file.xyz")), Lang::Unknown);
        assert_eq!(detect_language(Path::new("Makefile")), Lang::Unknown);
    }

    #[test]
    fn id_roundtrip() {
        for lang in ALL {
            assert_eq!(Lang::from_id(lang.id()), lang);
        }
        assert_eq!(Lang::from_id("cobol"), Lang::Unknown);
    }

    #[test]
    fn every_marker_set_compiles() {
        for lang in ALL {
            if let Markers::Semantic(set) = lang.boundary_markers() {
                assert!(!set.is_empty(), "{lang} has an empty marker set");
            }
        }
    }

    #[test]
    fn python_markers() {
        let m = Lang::Python.boundary_markers();
        assert!(m.is_boundary("def login(user):\n"));
        assert!(m.is_boundary("    def method(self):"));
        assert!(m.is_boundary("class Session:"));
        assert!(m.is_boundary("@property"));
        assert!(m.is_boundary("if __name__ == \"__main__\":"));
        assert!(!m.is_boundary("    return self.value"));
        assert!(!m.is_boundary("# def commented"));
    }

    #[test]
    fn rust_markers() {
        let m = Lang::Rust.boundary_markers();
        assert!(m.is_boundary("pub fn run() {"));
        assert!(m.is_boundary("pub(crate) async fn fetch() {"));
        assert!(m.is_boundary("impl<T> Foo<T> {"));
        assert!(m.is_boundary("#[derive(Debug)]"));
        assert!(!m.is_boundary("    let x = 1;"));
    }

    #[test]
    fn java_markers() {
        let m = Lang::Java.boundary_markers();
        assert!(m.is_boundary("public class DataProcessor {"));
        assert!(m.is_boundary("    @Override"));
        assert!(!m.is_boundary("        count++;"));
    }

    #[test]
    fn plain_text_languages_have_no_markers() {
        for lang in [Lang::Markdown, Lang::Text, Lang::Json, Lang::Yaml, Lang::Unknown] {
            assert!(matches!(lang.boundary_markers(), Markers::PlainText));
            assert!(!lang.boundary_markers().is_boundary("def foo():"));
        }
    }

    #[test]
    fn display_uses_human_names() {
        assert_eq!(Lang::Cpp.to_string(), "C++");
        assert_eq!(Lang::CSharp.to_string(), "C#");
    }
}
