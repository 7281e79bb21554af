//! Runtime-legal container names derived from tenant display names.
//!
//! The runtime accepts `[a-zA-Z0-9][a-zA-Z0-9_.-]*`. Display names arrive in
//! any script, so the name is lower-cased, transliterated to ASCII, stripped
//! of everything that is not alphanumeric and prefixed with [`NAME_PREFIX`].
//!
//! Transliteration happens before stripping so that two different
//! non-Latin names don't both collapse to the bare seed.

/// Literal tag every generated container name starts with.
pub const NAME_PREFIX: &str = "tg-";

/// Derive a container name from a display name and a uniqueness seed.
///
/// Pure and total: any input yields a name, identical inputs yield identical
/// names.
pub fn normalize(raw_name: &str, uniqueness_seed: &str) -> String {
    let mut out = String::with_capacity(NAME_PREFIX.len() + raw_name.len() + uniqueness_seed.len());
    out.push_str(NAME_PREFIX);

    for ch in raw_name.chars().chain(uniqueness_seed.chars()) {
        for lower in ch.to_lowercase() {
            push_ascii(&mut out, lower);
        }
    }
    out
}

fn push_ascii(out: &mut String, ch: char) {
    if ch.is_ascii() {
        // Separators, shell and path punctuation are dropped outright.
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        }
        return;
    }
    if let Some(latin) = transliterate(ch) {
        out.push_str(latin);
        return;
    }
    if ch.is_whitespace() {
        return;
    }
    // No table entry: keep the name distinct by spelling out the code point.
    out.push_str(&format!("u{:x}", ch as u32));
}

/// ASCII approximation for lower-case Cyrillic and accented Latin letters.
fn transliterate(ch: char) -> Option<&'static str> {
    let latin = match ch {
        // Cyrillic
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        'є' => "ye",
        'і' => "i",
        'ї' => "yi",
        'ґ' => "g",
        // Latin with diacritics
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ĺ' | 'ľ' | 'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ŕ' | 'ř' => "r",
        'ś' | 'š' | 'ş' | 'ș' => "s",
        'ť' | 'ţ' | 'ț' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'þ' => "th",
        _ => return None,
    };
    Some(latin)
}
