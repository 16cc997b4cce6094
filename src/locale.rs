use crate::domain::LocaleSlug;

/// ISO 639-1 -> (ISO 639-3, English name, native name) for every base code
/// the upstream catalog has published simulations in.
const LANGUAGE_TABLE: &[(&str, &str, &str, &str)] = &[
    ("am", "amh", "Amharic", "አማርኛ"),
    ("ar", "ara", "Arabic", "العربية"),
    ("az", "aze", "Azerbaijani", "azərbaycanca"),
    ("be", "bel", "Belarusian", "беларуская"),
    ("bg", "bul", "Bulgarian", "български"),
    ("bn", "ben", "Bengali", "বাংলা"),
    ("bs", "bos", "Bosnian", "bosanski"),
    ("ca", "cat", "Catalan", "català"),
    ("cs", "ces", "Czech", "čeština"),
    ("cy", "cym", "Welsh", "Cymraeg"),
    ("da", "dan", "Danish", "dansk"),
    ("de", "deu", "German", "Deutsch"),
    ("el", "ell", "Greek", "Ελληνικά"),
    ("en", "eng", "English", "English"),
    ("es", "spa", "Spanish", "español"),
    ("et", "est", "Estonian", "eesti"),
    ("eu", "eus", "Basque", "euskara"),
    ("fa", "fas", "Persian", "فارسی"),
    ("fi", "fin", "Finnish", "suomi"),
    ("fr", "fra", "French", "français"),
    ("ga", "gle", "Irish", "Gaeilge"),
    ("gl", "glg", "Galician", "galego"),
    ("gu", "guj", "Gujarati", "ગુજરાતી"),
    ("ha", "hau", "Hausa", "Hausa"),
    ("he", "heb", "Hebrew", "עברית"),
    ("hi", "hin", "Hindi", "हिन्दी"),
    ("hr", "hrv", "Croatian", "hrvatski"),
    ("ht", "hat", "Haitian Creole", "Kreyòl ayisyen"),
    ("hu", "hun", "Hungarian", "magyar"),
    ("hy", "hye", "Armenian", "հայերեն"),
    ("id", "ind", "Indonesian", "Bahasa Indonesia"),
    ("ig", "ibo", "Igbo", "Asụsụ Igbo"),
    ("is", "isl", "Icelandic", "íslenska"),
    ("it", "ita", "Italian", "italiano"),
    ("ja", "jpn", "Japanese", "日本語"),
    ("ka", "kat", "Georgian", "ქართული"),
    ("kk", "kaz", "Kazakh", "қазақша"),
    ("km", "khm", "Khmer", "ភាសាខ្មែរ"),
    ("kn", "kan", "Kannada", "ಕನ್ನಡ"),
    ("ko", "kor", "Korean", "한국어"),
    ("ku", "kur", "Kurdish", "Kurdî"),
    ("lo", "lao", "Lao", "ລາວ"),
    ("lt", "lit", "Lithuanian", "lietuvių"),
    ("lv", "lav", "Latvian", "latviešu"),
    ("mi", "mri", "Maori", "te reo Māori"),
    ("mk", "mkd", "Macedonian", "македонски"),
    ("ml", "mal", "Malayalam", "മലയാളം"),
    ("mn", "mon", "Mongolian", "монгол"),
    ("mr", "mar", "Marathi", "मराठी"),
    ("ms", "msa", "Malay", "Bahasa Melayu"),
    ("mt", "mlt", "Maltese", "Malti"),
    ("nb", "nob", "Norwegian Bokmål", "norsk bokmål"),
    ("nl", "nld", "Dutch", "Nederlands"),
    ("nn", "nno", "Norwegian Nynorsk", "norsk nynorsk"),
    ("om", "orm", "Oromo", "Oromoo"),
    ("pl", "pol", "Polish", "polski"),
    ("ps", "pus", "Pashto", "پښتو"),
    ("pt", "por", "Portuguese", "português"),
    ("ro", "ron", "Romanian", "română"),
    ("ru", "rus", "Russian", "русский"),
    ("rw", "kin", "Kinyarwanda", "Ikinyarwanda"),
    ("sh", "hbs", "Serbo-Croatian", "srpskohrvatski"),
    ("si", "sin", "Sinhala", "සිංහල"),
    ("sk", "slk", "Slovak", "slovenčina"),
    ("sl", "slv", "Slovenian", "slovenščina"),
    ("sq", "sqi", "Albanian", "shqip"),
    ("sr", "srp", "Serbian", "српски"),
    ("sv", "swe", "Swedish", "svenska"),
    ("sw", "swa", "Swahili", "Kiswahili"),
    ("ta", "tam", "Tamil", "தமிழ்"),
    ("te", "tel", "Telugu", "తెలుగు"),
    ("th", "tha", "Thai", "ไทย"),
    ("tk", "tuk", "Turkmen", "Türkmençe"),
    ("tr", "tur", "Turkish", "Türkçe"),
    ("uk", "ukr", "Ukrainian", "українська"),
    ("ur", "urd", "Urdu", "اردو"),
    ("uz", "uzb", "Uzbek", "oʻzbekcha"),
    ("vi", "vie", "Vietnamese", "Tiếng Việt"),
    ("zh", "zho", "Chinese", "中文"),
];

/// Legacy codes the upstream still serves that predate ISO 639-1.
const LEGACY_CODES: &[(&str, &str, &str, &str)] = &[
    ("ef", "efi", "Efik", "Usem Efịk"),
    ("fu", "fur", "Friulian", "furlan"),
    ("in", "ind", "Indonesian", "Bahasa Indonesia"),
    ("iw", "heb", "Hebrew", "עברית"),
    ("mo", "ron", "Moldavian", "Moldavian"),
    ("sp", "nso", "Northern Sotho", "Sesotho sa Leboa"),
];

/// Country variants whose native names the base-code table cannot produce.
const NATIVE_NAME_OVERRIDES: &[(&str, &str)] = &[
    ("ar_KW", "العربية (الكويت)"),
    ("ar_KY", "العربية (ليبيا)"),
    ("ar_MA", "العربية (المغرب)"),
    ("ar_SA", "العربية (السعودية)"),
    ("ar_SY", "العربية (سوريا)"),
    ("en_CA", "English (Canada)"),
    ("en_GB", "English (United Kingdom)"),
    ("es_CO", "español (Colombia)"),
    ("es_ES", "español (España)"),
    ("es_MX", "español (México)"),
    ("es_PE", "español (Perú)"),
    ("es_UY", "español (Uruguay)"),
    ("fa_DA", "دری"),
    ("ku_TR", "Kurmancî"),
    ("pt_BR", "português (Brasil)"),
    ("zh_CN", "中文 (中国)"),
    ("zh_HK", "中文 (香港)"),
    ("zh_TW", "中文 (台灣)"),
];

fn table_row(base: &str) -> Option<&'static (&'static str, &'static str, &'static str, &'static str)>
{
    LANGUAGE_TABLE
        .iter()
        .find(|(code, ..)| *code == base)
        .or_else(|| LEGACY_CODES.iter().find(|(code, ..)| *code == base))
}

/// ISO 639-3 code for a locale slug, ignoring any country variant.
pub fn iso639_3(slug: &LocaleSlug) -> Option<&'static str> {
    table_row(slug.base_code()).map(|(_, iso3, ..)| *iso3)
}

/// English display name for a locale.
pub fn english_name(slug: &LocaleSlug) -> String {
    table_row(slug.base_code())
        .map(|(_, _, name, _)| (*name).to_string())
        .unwrap_or_else(|| slug.as_str().to_string())
}

/// Native display name, preferring the per-variant overrides.
pub fn native_name(slug: &LocaleSlug) -> String {
    NATIVE_NAME_OVERRIDES
        .iter()
        .find(|(code, _)| *code == slug.as_str())
        .map(|(_, native)| (*native).to_string())
        .or_else(|| table_row(slug.base_code()).map(|(.., native)| (*native).to_string()))
        .unwrap_or_else(|| slug.as_str().to_string())
}
