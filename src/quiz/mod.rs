pub mod accessor;
pub mod cache;
pub mod generator;
pub mod model;
pub mod refill;
pub mod session;

/// Maximum number of questions kept in the cache.
pub const CACHE_SIZE: usize = 200;
/// The refill worker tops the cache up whenever it holds fewer questions than this.
pub const CACHE_MIN: usize = 100;

const USAGE_LIMIT_PROMPT: &str = "¡Límite de uso alcanzado!";
const USAGE_LIMIT_EXPLANATION: &str =
    "Se ha superado el límite de uso de la API. Por favor, espera un minuto y vuelve a intentarlo.";

/// A multiple-choice question as produced by the model.
///
/// Fields the model omitted stay `None`; nothing here checks that
/// `correct_answer` is actually one of `options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuestionRecord {
    pub prompt: Option<String>,
    pub code: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub explanation: String,
}

impl QuestionRecord {
    pub fn new(
        prompt: impl Into<String>,
        code: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            prompt: Some(prompt.into()),
            code: Some(code.into()),
            options,
            correct_answer: Some(correct_answer.into()),
            explanation: explanation.into(),
        }
    }

    /// Shown instead of a question when the upstream quota is exhausted.
    pub fn usage_limit() -> Self {
        Self::new(USAGE_LIMIT_PROMPT, "", Vec::new(), "", USAGE_LIMIT_EXPLANATION)
    }

    /// Stand-in for a question that could not be generated. Nothing but the
    /// failure detail is filled in.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            explanation: detail.into(),
            ..Self::default()
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.prompt.is_none() && self.options.is_empty()
    }

    /// Only records carrying both a prompt and a code snippet are admitted to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.prompt.is_some() && self.code.is_some()
    }

    pub fn is_usage_limit(&self) -> bool {
        self.prompt.as_deref() == Some(USAGE_LIMIT_PROMPT) && self.options.is_empty()
    }
}

/// What the generator hands back when the model reply could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub error: String,
    pub detail: String,
    pub raw: String,
}

impl ErrorRecord {
    pub fn new(detail: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            error: "No se pudo extraer el JSON".to_string(),
            detail: detail.into(),
            raw: raw.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_limit_record_has_no_options() {
        let record = QuestionRecord::usage_limit();
        assert!(record.is_usage_limit());
        assert!(record.options.is_empty());
        assert_eq!(record.code.as_deref(), Some(""));
        assert_eq!(record.correct_answer.as_deref(), Some(""));
        assert!(record.explanation.contains("espera un minuto"));
    }

    #[test]
    fn cacheable_requires_prompt_and_code() {
        let mut record = QuestionRecord::new("¿Qué imprime?", "", vec![], "", "");
        assert!(record.is_cacheable());

        record.code = None;
        assert!(!record.is_cacheable());

        assert!(!QuestionRecord::default().is_cacheable());
    }

    #[test]
    fn unavailable_record_keeps_the_detail() {
        let record = QuestionRecord::unavailable("expected value at line 1 column 1");
        assert!(record.is_unavailable());
        assert!(!record.is_cacheable());
        assert!(!record.is_usage_limit());
        assert_eq!(record.explanation, "expected value at line 1 column 1");
    }
}
