use std::collections::HashMap;

/// Alias → canonical name pairs for the league's host cities
///
/// Arabic spellings come straight from fixture sheets, Latin ones from observer records.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("الرياض", "Riyadh"),
    ("riyadh", "Riyadh"),
    ("ar riyadh", "Riyadh"),
    ("جدة", "Jeddah"),
    ("جده", "Jeddah"),
    ("jeddah", "Jeddah"),
    ("jiddah", "Jeddah"),
    ("jedda", "Jeddah"),
    ("مكة", "Makkah"),
    ("مكة المكرمة", "Makkah"),
    ("makkah", "Makkah"),
    ("mecca", "Makkah"),
    ("المدينة", "Madinah"),
    ("المدينة المنورة", "Madinah"),
    ("madinah", "Madinah"),
    ("medina", "Madinah"),
    ("al madinah", "Madinah"),
    ("الدمام", "Dammam"),
    ("dammam", "Dammam"),
    ("الخبر", "Khobar"),
    ("khobar", "Khobar"),
    ("al khobar", "Khobar"),
    ("الظهران", "Dhahran"),
    ("dhahran", "Dhahran"),
    ("الأحساء", "Al-Ahsa"),
    ("الاحساء", "Al-Ahsa"),
    ("al-ahsa", "Al-Ahsa"),
    ("al ahsa", "Al-Ahsa"),
    ("hofuf", "Al-Ahsa"),
    ("الهفوف", "Al-Ahsa"),
    ("أبها", "Abha"),
    ("ابها", "Abha"),
    ("abha", "Abha"),
    ("خميس مشيط", "Khamis Mushait"),
    ("khamis mushait", "Khamis Mushait"),
    ("الطائف", "Taif"),
    ("taif", "Taif"),
    ("at taif", "Taif"),
    ("بريدة", "Buraidah"),
    ("buraidah", "Buraidah"),
    ("buraydah", "Buraidah"),
    ("عنيزة", "Unaizah"),
    ("unaizah", "Unaizah"),
    ("الرس", "Ar Rass"),
    ("ar rass", "Ar Rass"),
    ("تبوك", "Tabuk"),
    ("tabuk", "Tabuk"),
    ("حائل", "Hail"),
    ("hail", "Hail"),
    ("ha'il", "Hail"),
    ("جازان", "Jazan"),
    ("جيزان", "Jazan"),
    ("jazan", "Jazan"),
    ("jizan", "Jazan"),
    ("نجران", "Najran"),
    ("najran", "Najran"),
    ("الباحة", "Al Bahah"),
    ("al bahah", "Al Bahah"),
    ("الجبيل", "Jubail"),
    ("jubail", "Jubail"),
    ("ينبع", "Yanbu"),
    ("yanbu", "Yanbu"),
    ("عرعر", "Arar"),
    ("arar", "Arar"),
    ("سكاكا", "Sakaka"),
    ("sakaka", "Sakaka"),
];

/// Maps raw city names to the standard form used for distance lookups
#[derive(Debug, Clone)]
pub struct CityCanonicalizer {
    aliases: HashMap<String, String>,
}

impl CityCanonicalizer {
    /// Canonicalizer with no aliases: names are only trimmed
    pub fn empty() -> Self {
        Self { aliases: HashMap::new() }
    }

    pub fn with_builtin_aliases() -> Self {
        let mut canonicalizer = Self::empty();
        canonicalizer.extend(
            BUILTIN_ALIASES
                .iter()
                .map(|(alias, canonical)| (alias.to_string(), canonical.to_string())),
        );
        canonicalizer
    }

    /// Add alias entries; later entries override earlier ones
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (alias, canonical) in entries {
            let canonical = normalize_whitespace(&canonical);
            if canonical.is_empty() {
                continue;
            }
            // Canonical names always resolve to themselves
            self.aliases.insert(alias_key(&canonical), canonical.clone());
            self.aliases.insert(alias_key(&alias), canonical);
        }
    }

    /// Canonical form of `raw`, or `None` when the name is not in the table
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.aliases.get(&alias_key(raw)).map(String::as_str)
    }

    /// Canonical form of `raw`; unmapped names pass through with whitespace normalized
    pub fn canonicalize(&self, raw: &str) -> String {
        self.lookup(raw)
            .map(str::to_string)
            .unwrap_or_else(|| normalize_whitespace(raw))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Default for CityCanonicalizer {
    fn default() -> Self {
        Self::with_builtin_aliases()
    }
}

#[inline]
fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[inline]
fn alias_key(raw: &str) -> String {
    normalize_whitespace(raw).to_lowercase()
}
