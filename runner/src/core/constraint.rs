//! The constraint contract enforced by the runner.

use serde::Serialize;

use crate::core::types::Lang;

/// How a constraint reacts to text growing one chunk at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintFamily {
    /// Decidable on any prefix (lipogram, monovocalism...).
    Character,
    /// Judged per word; only checked once the text ends on a boundary.
    WordStart,
    /// Each word length depends on the previous one; generated word by word.
    LengthSequence,
    /// Only meaningful on the finished text (palindrome).
    Whole,
}

impl ConstraintFamily {
    pub fn is_word_based(self) -> bool {
        matches!(self, Self::WordStart | Self::LengthSequence)
    }

    /// Whether partial text can be validated mid-stream.
    pub fn checks_while_streaming(self) -> bool {
        !matches!(self, Self::Whole)
    }
}

/// Which letters a select parameter offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterKind {
    Letter,
    Vowel,
    Consonant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSpec {
    None,
    Select {
        kind: LetterKind,
        options: &'static [char],
    },
    Text {
        label: &'static str,
        placeholder: &'static str,
    },
}

impl ParamSpec {
    /// Whether `param` is usable for this spec. `None` ignores the parameter.
    pub fn accepts(&self, param: &str) -> bool {
        match self {
            Self::None => true,
            Self::Select { options, .. } => {
                let mut chars = param.trim().chars().flat_map(char::to_lowercase);
                match (chars.next(), chars.next()) {
                    (Some(c), None) => options.contains(&c),
                    _ => false,
                }
            }
            Self::Text { .. } => !param.trim().is_empty(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Select { kind, options } => {
                let kind = match kind {
                    LetterKind::Letter => "letter",
                    LetterKind::Vowel => "vowel",
                    LetterKind::Consonant => "consonant",
                };
                let options: String = options.iter().collect();
                format!("{kind} [{options}]")
            }
            Self::Text { label, .. } => format!("text ({label})"),
        }
    }
}

/// What a rule found wrong, rendered in the run language on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    ForbiddenLetter { letter: String },
    ForeignVowel { vowel: char, allowed: char },
    WrongInitial { word: String, initial: String },
    NoAlphanumerics,
    NotPalindrome,
    WrongLength { word: String, expected: usize, found: usize },
    LetterNotInReference { letter: char, reference: String },
}

impl ViolationKind {
    pub fn message(&self, lang: Lang) -> String {
        match (self, lang) {
            (Self::ForbiddenLetter { letter }, Lang::Fr) => {
                format!("lettre interdite détectée : \"{letter}\"")
            }
            (Self::ForbiddenLetter { letter }, Lang::En) => {
                format!("forbidden letter detected: \"{letter}\"")
            }
            (Self::ForeignVowel { vowel, allowed }, Lang::Fr) => {
                format!("la voyelle \"{vowel}\" est interdite (seulement \"{allowed}\")")
            }
            (Self::ForeignVowel { vowel, allowed }, Lang::En) => {
                format!("vowel \"{vowel}\" is not allowed (only \"{allowed}\")")
            }
            (Self::WrongInitial { word, initial }, Lang::Fr) => {
                format!("le mot \"{word}\" ne commence pas par \"{initial}\"")
            }
            (Self::WrongInitial { word, initial }, Lang::En) => {
                format!("word \"{word}\" does not start with \"{initial}\"")
            }
            (Self::NoAlphanumerics, Lang::Fr) => {
                "le texte ne contient ni lettre ni chiffre".to_string()
            }
            (Self::NoAlphanumerics, Lang::En) => "text has no letters or digits".to_string(),
            (Self::NotPalindrome, Lang::Fr) => {
                "le texte ne se lit pas de la même façon à l'envers".to_string()
            }
            (Self::NotPalindrome, Lang::En) => "text does not read the same backwards".to_string(),
            (
                Self::WrongLength {
                    word,
                    expected,
                    found,
                },
                Lang::Fr,
            ) => format!("le mot \"{word}\" devrait avoir {expected} lettres (il en a {found})"),
            (
                Self::WrongLength {
                    word,
                    expected,
                    found,
                },
                Lang::En,
            ) => format!("word \"{word}\" should have {expected} letters (has {found})"),
            (Self::LetterNotInReference { letter, reference }, Lang::Fr) => {
                format!("la lettre \"{letter}\" n'apparaît pas dans \"{reference}\"")
            }
            (Self::LetterNotInReference { letter, reference }, Lang::En) => {
                format!("letter \"{letter}\" does not appear in \"{reference}\"")
            }
        }
    }
}

/// Outcome of validating a text against a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Validation {
    pub valid: bool,
    /// Set when invalid.
    pub reason: Option<ViolationKind>,
    /// Informational note on valid text (e.g. letters still missing).
    pub note: Option<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn ok_with_note(note: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: None,
            note: Some(note.into()),
        }
    }

    pub fn violation(reason: ViolationKind) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            note: None,
        }
    }

    /// The reason in `lang`, if invalid.
    pub fn reason_in(&self, lang: Lang) -> Option<String> {
        if self.valid {
            return None;
        }
        Some(match &self.reason {
            Some(kind) => kind.message(lang),
            None => match lang {
                Lang::Fr => "contrainte non respectée".to_string(),
                Lang::En => "constraint violated".to_string(),
            },
        })
    }
}

/// A pure predicate over text plus the metadata the runner and prompts need.
///
/// Streaming enforcement assumes the predicate is monotonic: once a prefix is
/// invalid, every extension of it is invalid too. Constraints that are not
/// must report [`ConstraintFamily::Whole`].
pub trait Constraint: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self, lang: Lang) -> &'static str;
    fn description(&self, lang: Lang) -> &'static str;

    fn param_spec(&self) -> ParamSpec {
        ParamSpec::None
    }

    fn family(&self) -> ConstraintFamily {
        ConstraintFamily::Character
    }

    fn validate(&self, text: &str, param: &str) -> Validation;
}
