//! Devanagari to Roman script, the way Hindi is casually typed ("Hinglish").
//!
//! This is not a scholarly transliteration. Long vowels are doubled (`aa`,
//! `ee`, `oo`) except at the end of a word, the inherent `a` is dropped at the
//! end of a word, and nasal signs become `n`. Text outside the Devanagari
//! block passes through untouched.
//!
//! ```text
//! आप कैसे हो?          →  aap kaise ho?
//! आप क्या कर रहे हो?    →  aap kya kar rahe ho?
//! ```

const NUKTA: char = '\u{093C}';
const VIRAMA: char = '\u{094D}';
const CHANDRABINDU: char = '\u{0901}';
const ANUSVARA: char = '\u{0902}';
const VISARGA: char = '\u{0903}';

/// Romanize every Devanagari run in `text`.
pub fn romanize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    // A consonant was written and its inherent vowel is still undecided.
    let mut pending_schwa = false;
    // Vowel sounds written so far in the current word.
    let mut nuclei = 0usize;

    while let Some(c) = chars.next() {
        if let Some(roman) = consonant(c) {
            if pending_schwa {
                out.push('a');
                nuclei += 1;
            }
            if chars.peek() == Some(&NUKTA) {
                chars.next();
                out.push_str(nukta_form(c).unwrap_or(roman));
            } else {
                out.push_str(roman);
            }
            pending_schwa = true;
            continue;
        }

        if let Some((long, word_final)) = vowel_sign(c) {
            let ends_word = !chars.peek().is_some_and(|&n| is_word_char(n));
            out.push_str(if ends_word { word_final } else { long });
            pending_schwa = false;
            nuclei += 1;
            continue;
        }

        if let Some(roman) = independent_vowel(c) {
            if pending_schwa {
                out.push('a');
            }
            out.push_str(roman);
            pending_schwa = false;
            nuclei += 1;
            continue;
        }

        match c {
            VIRAMA => pending_schwa = false,
            NUKTA => {}
            CHANDRABINDU | ANUSVARA | VISARGA => {
                if pending_schwa {
                    out.push('a');
                    pending_schwa = false;
                    nuclei += 1;
                }
                out.push(if c == VISARGA { 'h' } else { 'n' });
            }
            _ => {
                // Word boundary: a lone consonant keeps its vowel ("na").
                if pending_schwa && nuclei == 0 {
                    out.push('a');
                }
                pending_schwa = false;
                nuclei = 0;
                push_other(&mut out, c);
            }
        }
    }

    if pending_schwa && nuclei == 0 {
        out.push('a');
    }
    out
}

/// `true` if `text` contains any Devanagari letter.
pub fn has_devanagari(text: &str) -> bool {
    text.chars().any(is_word_char)
}

/// Letters and signs that continue a word; excludes danda and digits.
fn is_word_char(c: char) -> bool {
    matches!(c, '\u{0900}'..='\u{0963}' | '\u{0971}'..='\u{097F}')
}

fn consonant(c: char) -> Option<&'static str> {
    Some(match c {
        'क' => "k",
        'ख' => "kh",
        'ग' => "g",
        'घ' => "gh",
        'ङ' => "n",
        'च' => "ch",
        'छ' => "chh",
        'ज' => "j",
        'झ' => "jh",
        'ञ' => "n",
        'ट' => "t",
        'ठ' => "th",
        'ड' => "d",
        'ढ' => "dh",
        'ण' => "n",
        'त' => "t",
        'थ' => "th",
        'द' => "d",
        'ध' => "dh",
        'न' => "n",
        'प' => "p",
        'फ' => "ph",
        'ब' => "b",
        'भ' => "bh",
        'म' => "m",
        'य' => "y",
        'र' => "r",
        'ल' => "l",
        'ळ' => "l",
        'व' => "v",
        'श' => "sh",
        'ष' => "sh",
        'स' => "s",
        'ह' => "h",
        // Precomposed nukta letters.
        '\u{0958}' => "q",
        '\u{0959}' => "kh",
        '\u{095A}' => "gh",
        '\u{095B}' => "z",
        '\u{095C}' => "r",
        '\u{095D}' => "rh",
        '\u{095E}' => "f",
        '\u{095F}' => "y",
        _ => return None,
    })
}

/// Consonant followed by a combining nukta.
fn nukta_form(c: char) -> Option<&'static str> {
    Some(match c {
        'क' => "q",
        'ज' => "z",
        'फ' => "f",
        'ड' => "r",
        'ढ' => "rh",
        _ => return None,
    })
}

/// Dependent vowel sign: (inside a word, at the end of a word).
fn vowel_sign(c: char) -> Option<(&'static str, &'static str)> {
    Some(match c {
        '\u{093E}' => ("aa", "a"),
        '\u{093F}' => ("i", "i"),
        '\u{0940}' => ("ee", "i"),
        '\u{0941}' => ("u", "u"),
        '\u{0942}' => ("oo", "u"),
        '\u{0943}' => ("ri", "ri"),
        '\u{0945}' => ("e", "e"),
        '\u{0947}' => ("e", "e"),
        '\u{0948}' => ("ai", "ai"),
        '\u{0949}' => ("o", "o"),
        '\u{094B}' => ("o", "o"),
        '\u{094C}' => ("au", "au"),
        _ => return None,
    })
}

fn independent_vowel(c: char) -> Option<&'static str> {
    Some(match c {
        'अ' => "a",
        'आ' => "aa",
        'इ' => "i",
        'ई' => "ee",
        'उ' => "u",
        'ऊ' => "oo",
        'ऋ' => "ri",
        'ऍ' => "e",
        'ए' => "e",
        'ऐ' => "ai",
        'ऑ' => "o",
        'ओ' => "o",
        'औ' => "au",
        'ॐ' => "om",
        _ => return None,
    })
}

fn push_other(out: &mut String, c: char) {
    match c {
        '\u{0964}' | '\u{0965}' => out.push('.'),
        '\u{0966}'..='\u{096F}' => {
            let digit = c as u32 - 0x0966;
            out.push(char::from(b'0' + digit as u8));
        }
        // Avagraha and the abbreviation sign have no sound of their own.
        '\u{093D}' | '\u{0970}' => {}
        _ => out.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everyday_sentences() {
        assert_eq!(romanize("आप कैसे हो?"), "aap kaise ho?");
        assert_eq!(romanize("आप क्या कर रहे हो?"), "aap kya kar rahe ho?");
        assert_eq!(romanize("मैं ठीक हूँ।"), "main theek hoon.");
        assert_eq!(romanize("नमस्ते दुनिया"), "namaste duniya");
    }

    #[test]
    fn final_long_vowels_are_shortened() {
        assert_eq!(romanize("गया"), "gaya");
        assert_eq!(romanize("नदी"), "nadi");
    }

    #[test]
    fn lone_consonant_keeps_inherent_vowel() {
        assert_eq!(romanize("न"), "na");
        assert_eq!(romanize("स्व"), "sva");
    }

    #[test]
    fn nukta_letters() {
        assert_eq!(romanize("ज़रूर"), "zaroor");
        assert_eq!(romanize("\u{095E}"), "fa");
    }

    #[test]
    fn digits_and_latin_pass_through() {
        assert_eq!(romanize("Page ३ of 10"), "Page 3 of 10");
        assert_eq!(romanize("already roman"), "already roman");
        assert!(!has_devanagari("already roman"));
        assert!(has_devanagari("hi नमस्ते"));
    }
}
