//! Judge languages and editor themes.
//!
//! The language set is fixed for the lifetime of a session. It defaults to
//! the Judge0 CE list below and can be replaced from configuration.

use serde::{Deserialize, Serialize};

use crate::error::{JudgeLoopError, Result};

/// Judge id of the language a fresh session starts with (JavaScript).
pub const DEFAULT_LANGUAGE_ID: u32 = 63;

/// Source a fresh session starts with.
pub const DEFAULT_SOURCE: &str = r"/**
* Problem: Binary Search: Search a sorted array for a target value.
*/

// Time: O(log n)
const binarySearch = (arr, target) => {
 return binarySearchHelper(arr, target, 0, arr.length - 1);
};

const binarySearchHelper = (arr, target, start, end) => {
 if (start > end) {
   return false;
 }
 let mid = Math.floor((start + end) / 2);
 if (arr[mid] === target) {
   return mid;
 }
 if (arr[mid] < target) {
   return binarySearchHelper(arr, target, mid + 1, end);
 }
 if (arr[mid] > target) {
   return binarySearchHelper(arr, target, start, mid - 1);
 }
};

const arr = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
const target = 5;
console.log(binarySearch(arr, target));
";

/// A compiler or interpreter known to the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// The judge's numeric language identifier.
    pub id: u32,
    /// Human-readable name, sent to the AI chat endpoint.
    pub name: String,
    /// Short key used by the AI backend (e.g. `javascript`, `cpp`).
    pub value: String,
}

impl Language {
    /// Creates a new `Language`.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An editor theme selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme key understood by the editor.
    pub value: String,
    /// Display label.
    pub label: String,
}

impl Theme {
    /// Creates a new `Theme`.
    #[must_use]
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new("blackboard", "Blackboard")
    }
}

const BUILTIN_LANGUAGES: &[(u32, &str, &str)] = &[
    (63, "JavaScript (Node.js 12.14.0)", "javascript"),
    (45, "Assembly (NASM 2.14.02)", "assembly"),
    (46, "Bash (5.0.0)", "bash"),
    (47, "Basic (FBC 1.07.1)", "basic"),
    (75, "C (Clang 7.0.1)", "c"),
    (76, "C++ (Clang 7.0.1)", "cpp"),
    (48, "C (GCC 7.4.0)", "c"),
    (52, "C++ (GCC 7.4.0)", "cpp"),
    (49, "C (GCC 8.3.0)", "c"),
    (53, "C++ (GCC 8.3.0)", "cpp"),
    (50, "C (GCC 9.2.0)", "c"),
    (54, "C++ (GCC 9.2.0)", "cpp"),
    (86, "Clojure (1.10.1)", "clojure"),
    (51, "C# (Mono 6.6.0.161)", "csharp"),
    (77, "COBOL (GnuCOBOL 2.2)", "cobol"),
    (55, "Common Lisp (SBCL 2.0.0)", "lisp"),
    (56, "D (DMD 2.089.1)", "d"),
    (57, "Elixir (1.9.4)", "elixir"),
    (58, "Erlang (OTP 22.2)", "erlang"),
    (44, "Executable", "exe"),
    (87, "F# (.NET Core SDK 3.1.202)", "fsharp"),
    (59, "Fortran (GFortran 9.2.0)", "fortran"),
    (60, "Go (1.13.5)", "go"),
    (88, "Groovy (3.0.3)", "groovy"),
    (61, "Haskell (GHC 8.8.1)", "haskell"),
    (62, "Java (OpenJDK 13.0.1)", "java"),
    (78, "Kotlin (1.3.70)", "kotlin"),
    (64, "Lua (5.3.5)", "lua"),
    (79, "Objective-C (Clang 7.0.1)", "objectivec"),
    (65, "OCaml (4.09.0)", "ocaml"),
    (66, "Octave (5.1.0)", "octave"),
    (67, "Pascal (FPC 3.0.4)", "pascal"),
    (85, "Perl (5.28.1)", "perl"),
    (68, "PHP (7.4.1)", "php"),
    (43, "Plain Text", "text"),
    (69, "Prolog (GNU Prolog 1.4.5)", "prolog"),
    (70, "Python (2.7.17)", "python"),
    (71, "Python (3.8.1)", "python"),
    (80, "R (4.0.0)", "r"),
    (72, "Ruby (2.7.0)", "ruby"),
    (73, "Rust (1.40.0)", "rust"),
    (81, "Scala (2.13.2)", "scala"),
    (82, "SQL (SQLite 3.27.2)", "sql"),
    (83, "Swift (5.2.3)", "swift"),
    (74, "TypeScript (3.7.4)", "typescript"),
    (84, "Visual Basic.Net (vbnc 0.0.0.5943)", "vbnet"),
];

/// The fixed set of languages a session may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageCatalog {
    languages: Vec<Language>,
}

impl Default for LanguageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageCatalog {
    /// Returns the built-in Judge0 CE language list.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            languages: BUILTIN_LANGUAGES
                .iter()
                .map(|(id, name, value)| Language::new(*id, *name, *value))
                .collect(),
        }
    }

    /// Builds a catalog from an explicit list.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if the list is empty or repeats an id.
    pub fn from_languages(languages: Vec<Language>) -> Result<Self> {
        if languages.is_empty() {
            return Err(JudgeLoopError::config_validation(
                "languages must not be empty",
                "Remove the languages field to use the built-in list, or list at least one language",
            ));
        }
        for (index, language) in languages.iter().enumerate() {
            if languages[..index].iter().any(|l| l.id == language.id) {
                return Err(JudgeLoopError::config_validation(
                    format!("language id {} is listed twice", language.id),
                    "Give every entry in languages a distinct judge id",
                ));
            }
        }
        Ok(Self { languages })
    }

    /// Looks up a language by judge id.
    #[must_use]
    pub fn by_id(&self, id: u32) -> Option<&Language> {
        self.languages.iter().find(|l| l.id == id)
    }

    /// Looks up a language by AI backend key.
    ///
    /// Several compilers share a key; the first listed wins.
    #[must_use]
    pub fn by_value(&self, value: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.value == value)
    }

    /// Returns all languages in catalog order.
    #[must_use]
    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    /// Returns the number of languages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.languages.len()
    }

    /// Returns `true` if the catalog has no languages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}
