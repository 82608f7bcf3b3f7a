use std::time::{SystemTime, UNIX_EPOCH};

use teloxide::utils::html::escape;

use crate::quiz::QuestionRecord;

/// Number of answers after which a quiz ends.
pub const QUIZ_LENGTH: u32 = 10;

/// Label offered when a record carries no options to choose from.
pub const CONTINUE_BUTTON: &str = "Continuar";

/// A wrongly answered question, kept for the final summary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mistake {
    pub prompt: Option<String>,
    pub code: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: Option<String>,
    pub explanation: String,
    pub chosen: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Wrong {
        correct_answer: String,
        explanation: String,
    },
}

/// Per-chat quiz state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuizSession {
    pub score: u32,
    pub total: u32,
    pub started_at: u64,
    pub current: QuestionRecord,
    pub mistakes: Vec<Mistake>,
}

impl QuizSession {
    pub fn start(first: QuestionRecord) -> Self {
        Self {
            score: 0,
            total: 0,
            started_at: unix_now(),
            current: first,
            mistakes: Vec::new(),
        }
    }

    /// 1-based number of the question currently shown.
    pub fn question_number(&self) -> u32 {
        self.total + 1
    }

    /// Grade `choice` against the current question. Surrounding whitespace is
    /// ignored; a question without a correct answer can't be answered right.
    pub fn answer(&mut self, choice: &str) -> Verdict {
        self.total += 1;

        let choice = choice.trim();
        let correct = self.current.correct_answer.as_deref().map(str::trim);
        if correct == Some(choice) {
            self.score += 1;
            return Verdict::Correct;
        }

        let current = &self.current;
        self.mistakes.push(Mistake {
            prompt: current.prompt.clone(),
            code: current.code.clone(),
            options: current.options.clone(),
            correct_answer: current.correct_answer.clone(),
            explanation: current.explanation.clone(),
            chosen: choice.to_string(),
        });

        Verdict::Wrong {
            correct_answer: correct.unwrap_or_default().to_string(),
            explanation: current.explanation.clone(),
        }
    }

    pub fn is_finished(&self, quiz_length: u32) -> bool {
        self.total >= quiz_length
    }

    pub fn advance(&mut self, next: QuestionRecord) {
        self.current = next;
    }

    pub fn elapsed_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }

    /// Final results as HTML messages: a header followed by one message per
    /// mistake, so a long review never hits Telegram's message size limit.
    pub fn summary(&self, now: u64) -> Vec<String> {
        let mut messages = vec![format!(
            "¡Quiz terminado!\nRespuestas correctas: <b>{}</b> de {}\nTiempo: {} s",
            self.score,
            self.total,
            self.elapsed_secs(now)
        )];

        for (i, mistake) in self.mistakes.iter().enumerate() {
            let mut text = format!(
                "<b>Error {}:</b> {}\n",
                i + 1,
                escape(mistake.prompt.as_deref().unwrap_or_default())
            );
            if let Some(code) = mistake.code.as_deref().filter(|c| !c.is_empty()) {
                text.push_str(&format!("<pre>{}</pre>\n", escape(code)));
            }
            text.push_str(&format!(
                "Tu respuesta: {}\nRespuesta correcta: {}",
                escape(&mistake.chosen),
                escape(mistake.correct_answer.as_deref().unwrap_or_default())
            ));
            if !mistake.explanation.is_empty() {
                text.push_str(&format!("\n<i>{}</i>", escape(&mistake.explanation)));
            }
            messages.push(text);
        }

        messages
    }
}

/// HTML text of the message that shows `record`.
pub fn render_question(record: &QuestionRecord, number: u32) -> String {
    if record.is_usage_limit() {
        return format!(
            "<b>{}</b>\n\n{}",
            escape(record.prompt.as_deref().unwrap_or_default()),
            escape(&record.explanation)
        );
    }

    if record.is_unavailable() {
        let mut text = format!(
            "<b>Pregunta {}:</b> No se pudo generar la pregunta. Pulsa «{}» para seguir.",
            number, CONTINUE_BUTTON
        );
        if !record.explanation.is_empty() {
            text.push_str(&format!("\n\nDetalle: <i>{}</i>", escape(&record.explanation)));
        }
        return text;
    }

    let prompt = record.prompt.as_deref().unwrap_or_default();
    let mut text = format!("<b>Pregunta {}:</b> {}", number, escape(prompt));
    if let Some(code) = record.code.as_deref().filter(|c| !c.is_empty()) {
        text.push_str(&format!("\n\n<pre>{}</pre>", escape(code)));
    }
    text
}

/// Reply keyboard rows for `record`, one option per row.
pub fn answer_rows(record: &QuestionRecord) -> Vec<Vec<String>> {
    if record.options.is_empty() {
        return vec![vec![CONTINUE_BUTTON.to_string()]];
    }
    record.options.iter().map(|o| vec![o.clone()]).collect()
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
