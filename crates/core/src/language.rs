//! Best-effort language identification.
//!
//! Detection enriches chunks and documents; it never gates ingestion.
//! Callers go through [`detect_or_default`], which swallows
//! [`DetectionError`] and substitutes the configured default.

use crate::error::DetectionError;
use crate::models::LanguageCode;

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<LanguageCode, DetectionError>;
}

pub fn detect_or_default(
    detector: &dyn LanguageDetector,
    text: &str,
    default: &LanguageCode,
) -> LanguageCode {
    match detector.detect(text) {
        Ok(code) => code,
        Err(error) => {
            tracing::debug!(%error, fallback = %default, "language detection fell back");
            default.clone()
        }
    }
}

/// Trigram-based detection through `whatlang`. Results whatlang itself does
/// not consider reliable are reported as ambiguous.
#[derive(Debug, Clone)]
pub struct WhatlangDetector {
    /// Non-whitespace characters required before detection is attempted.
    pub min_chars: usize,
}

impl Default for WhatlangDetector {
    fn default() -> Self {
        Self { min_chars: 12 }
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<LanguageCode, DetectionError> {
        let chars = text.chars().filter(|ch| !ch.is_whitespace()).count();
        if chars < self.min_chars {
            return Err(DetectionError::TooShort { chars });
        }

        match whatlang::detect(text) {
            Some(info) if info.is_reliable() => Ok(iso_639_1(info.lang().code())),
            _ => Err(DetectionError::Ambiguous),
        }
    }
}

/// whatlang reports ISO 639-3; payloads carry two-letter codes where one
/// exists.
fn iso_639_1(code: &str) -> LanguageCode {
    let short = match code {
        "afr" => "af",
        "aka" => "ak",
        "amh" => "am",
        "ara" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bul" => "bg",
        "cat" => "ca",
        "ces" => "cs",
        "cmn" => "zh",
        "dan" => "da",
        "deu" => "de",
        "ell" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" => "et",
        "fin" => "fi",
        "fra" => "fr",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" => "hy",
        "ind" => "id",
        "ita" => "it",
        "jav" => "jv",
        "jpn" => "ja",
        "kan" => "kn",
        "kat" => "ka",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" => "lv",
        "lit" => "lt",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" => "mk",
        "mya" => "my",
        "nep" => "ne",
        "nld" => "nl",
        "nob" => "nb",
        "ori" => "or",
        "pan" => "pa",
        "pes" => "fa",
        "pol" => "pl",
        "por" => "pt",
        "ron" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "spa" => "es",
        "srp" => "sr",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tuk" => "tk",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "zul" => "zu",
        other => other,
    };
    LanguageCode::new(short)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Result<LanguageCode, DetectionError> {
        WhatlangDetector::default().detect(text)
    }

    #[test]
    fn detects_english_prose() {
        let code = detect(
            "The network is trained on a large corpus of documents and the weights are \
             updated after every batch until the loss on the validation set stops improving.",
        )
        .expect("english should be detected");
        assert_eq!(code.as_str(), "en");
    }

    #[test]
    fn detects_german_prose() {
        let code = detect(
            "Das neuronale Netz wird mit einer großen Menge von Dokumenten trainiert, und \
             die Gewichte werden nach jedem Durchlauf angepasst, bis sich das Ergebnis nicht \
             mehr verbessert.",
        )
        .expect("german should be detected");
        assert_eq!(code.as_str(), "de");
    }

    #[test]
    fn detects_languages_beyond_western_europe() {
        let polish = detect(
            "Sieci neuronowe uczą się na podstawie dużych zbiorów danych, a następnie są \
             oceniane na osobnym zbiorze testowym, żeby sprawdzić, czy dobrze uogólniają.",
        )
        .expect("polish should be detected");
        assert_eq!(polish.as_str(), "pl");

        let turkish = detect(
            "Yapay sinir ağları büyük veri kümeleri üzerinde eğitilir ve daha sonra ayrı bir \
             test kümesi üzerinde değerlendirilerek ne kadar iyi genelleştirdikleri ölçülür.",
        )
        .expect("turkish should be detected");
        assert_eq!(turkish.as_str(), "tr");
    }

    #[test]
    fn detects_non_latin_scripts() {
        let russian = detect(
            "Нейронные сети обучаются на больших наборах данных, а затем проверяются на \
             отдельной тестовой выборке, чтобы оценить качество обобщения.",
        )
        .expect("russian should be detected");
        assert_eq!(russian.as_str(), "ru");
    }

    #[test]
    fn short_text_is_rejected() {
        assert_eq!(detect("ok"), Err(DetectionError::TooShort { chars: 2 }));
    }

    #[test]
    fn text_without_letters_is_ambiguous() {
        assert_eq!(
            detect("2000 9000 12 40 ... 3.14 / 2.71 = 1.159"),
            Err(DetectionError::Ambiguous)
        );
    }

    #[test]
    fn three_letter_codes_are_shortened() {
        assert_eq!(iso_639_1("cmn").as_str(), "zh");
        assert_eq!(iso_639_1("swe").as_str(), "sv");
        assert_eq!(iso_639_1("xyz").as_str(), "xyz");
    }

    #[test]
    fn fallback_uses_default() {
        let detector = WhatlangDetector::default();
        let code = detect_or_default(&detector, "hi", &LanguageCode::new("fr"));
        assert_eq!(code.as_str(), "fr");
    }
}
