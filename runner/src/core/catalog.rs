//! Built-in constraints and lookup by id.
//!
//! Every rule compares lowercase, diacritic-free text (see
//! [`text::normalize`]), so `é` counts as `e`.

use crate::core::constraint::{
    Constraint, ConstraintFamily, LetterKind, ParamSpec, Validation, ViolationKind,
};
use crate::core::text::{self, is_elision_mark};
use crate::core::types::Lang;

pub const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u', 'y'];
pub const CONSONANTS: &[char] = &[
    'b', 'c', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'm', 'n', 'p', 'q', 'r', 's', 't', 'v', 'w', 'x',
    'z',
];
pub const ALPHABET: &[char] = &[
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z',
];

static CATALOG: [&dyn Constraint; 8] = [
    &Lipogram,
    &Monovocalism,
    &Tautogram,
    &Alliteration,
    &Palindrome,
    &Snowball,
    &BeauPresent,
    &Pangram,
];

pub fn all() -> &'static [&'static dyn Constraint] {
    &CATALOG
}

pub fn by_id(id: &str) -> Option<&'static dyn Constraint> {
    let id = id.trim();
    CATALOG
        .iter()
        .copied()
        .find(|c| c.id().eq_ignore_ascii_case(id))
}

/// Lowercase diacritic-free parameter letter(s).
fn param_letters(param: &str) -> String {
    text::normalize(param.trim())
}

pub struct Lipogram;

impl Constraint for Lipogram {
    fn id(&self) -> &'static str {
        "lipogram"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Lipogramme",
            Lang::En => "Lipogram",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Écrire sans jamais utiliser la lettre interdite.",
            Lang::En => "Write without ever using the forbidden letter.",
        }
    }

    fn param_spec(&self) -> ParamSpec {
        ParamSpec::Select {
            kind: LetterKind::Letter,
            options: ALPHABET,
        }
    }

    fn validate(&self, text: &str, param: &str) -> Validation {
        let forbidden = param_letters(param);
        if forbidden.is_empty() {
            return Validation::ok();
        }
        if text::normalize(text).contains(&forbidden) {
            return Validation::violation(ViolationKind::ForbiddenLetter { letter: forbidden });
        }
        Validation::ok()
    }
}

pub struct Monovocalism;

impl Constraint for Monovocalism {
    fn id(&self) -> &'static str {
        "monovocalism"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Monovocalisme",
            Lang::En => "Monovocalism",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Une seule voyelle autorisée dans tout le texte.",
            Lang::En => "A single vowel is allowed in the whole text.",
        }
    }

    fn param_spec(&self) -> ParamSpec {
        ParamSpec::Select {
            kind: LetterKind::Vowel,
            options: VOWELS,
        }
    }

    fn validate(&self, text: &str, param: &str) -> Validation {
        let allowed = param_letters(param);
        let Some(allowed) = allowed.chars().next() else {
            return Validation::ok();
        };
        match text::normalize(text)
            .chars()
            .find(|c| VOWELS.contains(c) && *c != allowed)
        {
            Some(vowel) => Validation::violation(ViolationKind::ForeignVowel { vowel, allowed }),
            None => Validation::ok(),
        }
    }
}

/// Shared by tautogram and alliteration: every word starts with `param`.
fn validate_initials(text: &str, param: &str) -> Validation {
    let initial = param_letters(param);
    if initial.is_empty() {
        return Validation::ok();
    }
    for word in text::words(text) {
        if !text::normalize(word).starts_with(&initial) {
            return Validation::violation(ViolationKind::WrongInitial {
                word: word.to_string(),
                initial,
            });
        }
    }
    Validation::ok()
}

pub struct Tautogram;

impl Constraint for Tautogram {
    fn id(&self) -> &'static str {
        "tautogram"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Tautogramme",
            Lang::En => "Tautogram",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Tous les mots commencent par la même lettre.",
            Lang::En => "Every word starts with the same letter.",
        }
    }

    fn param_spec(&self) -> ParamSpec {
        ParamSpec::Select {
            kind: LetterKind::Letter,
            options: ALPHABET,
        }
    }

    fn family(&self) -> ConstraintFamily {
        ConstraintFamily::WordStart
    }

    fn validate(&self, text: &str, param: &str) -> Validation {
        validate_initials(text, param)
    }
}

pub struct Alliteration;

impl Constraint for Alliteration {
    fn id(&self) -> &'static str {
        "alliteration"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Allitération",
            Lang::En => "Alliteration",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Tous les mots commencent par la même consonne.",
            Lang::En => "Every word starts with the same consonant.",
        }
    }

    fn param_spec(&self) -> ParamSpec {
        ParamSpec::Select {
            kind: LetterKind::Consonant,
            options: CONSONANTS,
        }
    }

    fn family(&self) -> ConstraintFamily {
        ConstraintFamily::WordStart
    }

    fn validate(&self, text: &str, param: &str) -> Validation {
        validate_initials(text, param)
    }
}

pub struct Palindrome;

impl Constraint for Palindrome {
    fn id(&self) -> &'static str {
        "palindrome"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr | Lang::En => "Palindrome",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Le texte se lit de la même façon dans les deux sens.",
            Lang::En => "The text reads the same forwards and backwards.",
        }
    }

    fn family(&self) -> ConstraintFamily {
        ConstraintFamily::Whole
    }

    fn validate(&self, text: &str, _param: &str) -> Validation {
        let cleaned: Vec<char> = text::normalize(text)
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        if cleaned.is_empty() {
            return Validation::violation(ViolationKind::NoAlphanumerics);
        }
        if cleaned.iter().eq(cleaned.iter().rev()) {
            Validation::ok()
        } else {
            Validation::violation(ViolationKind::NotPalindrome)
        }
    }
}

pub struct Snowball;

impl Snowball {
    /// Unlike the streaming boundary, a hyphen does not close a word here:
    /// `arc-` may still become `arc-en-ciel`.
    fn word_is_closed(text: &str) -> bool {
        text.chars().next_back().is_some_and(|c| {
            c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '!' | '?') || is_elision_mark(c)
        })
    }
}

impl Constraint for Snowball {
    fn id(&self) -> &'static str {
        "snowball"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Boule de neige",
            Lang::En => "Snowball",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Chaque mot a exactement une lettre de plus que le précédent.",
            Lang::En => "Each word has exactly one more letter than the previous one.",
        }
    }

    fn family(&self) -> ConstraintFamily {
        ConstraintFamily::LengthSequence
    }

    fn validate(&self, text: &str, _param: &str) -> Validation {
        let words: Vec<&str> = text::words(text).collect();
        let checked = if Self::word_is_closed(text) {
            &words[..]
        } else {
            &words[..words.len().saturating_sub(1)]
        };

        let mut previous: Option<usize> = None;
        for word in checked {
            let letters = text::word_letter_count(word);
            if letters == 0 {
                continue;
            }
            if let Some(prev) = previous
                && letters != prev + 1
            {
                return Validation::violation(ViolationKind::WrongLength {
                    word: (*word).to_string(),
                    expected: prev + 1,
                    found: letters,
                });
            }
            previous = Some(letters);
        }
        Validation::ok()
    }
}

pub struct BeauPresent;

impl Constraint for BeauPresent {
    fn id(&self) -> &'static str {
        "beau-present"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr | Lang::En => "Beau présent",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "N'utiliser que les lettres contenues dans le nom de référence.",
            Lang::En => "Use only the letters found in the reference name.",
        }
    }

    fn param_spec(&self) -> ParamSpec {
        ParamSpec::Text {
            label: "reference name",
            placeholder: "Georges Perec",
        }
    }

    fn validate(&self, text: &str, param: &str) -> Validation {
        let allowed: Vec<char> = text::normalize(param)
            .chars()
            .filter(|c| ALPHABET.contains(c))
            .collect();
        if allowed.is_empty() {
            return Validation::ok();
        }
        match text::normalize(text)
            .chars()
            .find(|c| ALPHABET.contains(c) && !allowed.contains(c))
        {
            Some(letter) => Validation::violation(ViolationKind::LetterNotInReference {
                letter,
                reference: param.trim().to_string(),
            }),
            None => Validation::ok(),
        }
    }
}

pub struct Pangram;

impl Pangram {
    pub fn missing_letters(text: &str) -> Vec<char> {
        let normalized = text::normalize(text);
        ALPHABET
            .iter()
            .copied()
            .filter(|c| !normalized.contains(*c))
            .collect()
    }
}

impl Constraint for Pangram {
    fn id(&self) -> &'static str {
        "pangram"
    }

    fn name(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Pangramme",
            Lang::En => "Pangram",
        }
    }

    fn description(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Fr => "Utiliser toutes les lettres de l'alphabet.",
            Lang::En => "Use every letter of the alphabet.",
        }
    }

    fn validate(&self, text: &str, _param: &str) -> Validation {
        let missing = Self::missing_letters(text);
        if missing.is_empty() {
            return Validation::ok();
        }
        let listed: Vec<String> = missing.iter().map(char::to_string).collect();
        Validation::ok_with_note(format!("missing letters: {}", listed.join(", ")))
    }
}
