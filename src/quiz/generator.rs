use std::sync::Arc;

use log::debug;
use serde_json::{Map, Value};

use crate::quiz::model::{ModelClient, ModelError};
use crate::quiz::{ErrorRecord, QuestionRecord};

pub const QUESTION_PROMPT: &str = r#"
Eres un generador experto de ejercicios de análisis de código en Python para estudiantes universitarios. Tu tarea es crear preguntas de opción múltiple, cada una con un enunciado claro, un fragmento de código Python bien formateado y cuatro opciones de respuesta, siguiendo estas reglas estrictas:

1. El código debe estar escrito en Python válido, usando la sintaxis de la última versión disponible.
2. Usa variables y nombres de funciones en español, en notación camelCase, para facilitar el entendimiento de los estudiantes hispanohablantes.
3. Los ejercicios deben integrar y combinar estos temas:
   - Estructuras secuenciales y condicionales (if, elif, else)
   - Estructuras repetitivas (for, while)
   - Funciones (def, argumentos, return)
   - Estructuras de datos: listas, tuplas, diccionarios y sets
   - Recursividad (cuando corresponda)
4. El código debe estar correctamente indentado y formateado, usando espacios estándar de Python (4 por nivel).
5. No incluyas comentarios, explicaciones ni texto adicional fuera del objeto JSON.
6. El fragmento de código debe ser autocontenible y ejecutable en Python, sin dependencias externas.
7. Las variables deben estar correctamente declaradas y usadas según las reglas de Python.
8. El código debe ser claro, didáctico y relevante para estudiantes de nivel universitario, evitando ambigüedades.
9. Cada pregunta debe ser única en su enunciado, código y opciones respecto a las anteriores de la misma sesión.
10. Si la pregunta requiere entrada de datos, usa la función input() y aclara los valores de entrada en el enunciado.
11. El código debe estar presentado en un bloque bien formateado, respetando la indentación y la sintaxis de Python.
12. Antes de decidir cuál es la respuesta correcta, debes ejecutar mentalmente el código y comprobar realmente cuál es la salida. No inventes ni asumas: si tienes dudas, investiga o analiza el código paso a paso.
13. Una vez que determines la respuesta correcta, vuelve a comprobar el código y verifica que la respuesta realmente corresponde a la salida esperada.
14. Bajo ninguna circunstancia inventes resultados o expliques sin haber comprobado el código.

Genera preguntas variadas de estos dos tipos (elige aleatoriamente en cada generación):
- ¿Qué salida tendrá el siguiente código?
- ¿Qué salida tendrá el siguiente código si se ingresan los siguientes valores? (en este caso, incluye en la pregunta los valores de entrada y asegúrate de que el código use input())

El formato de la respuesta debe ser un ÚNICO objeto JSON, SIN ningún texto antes o después, ni bloques de código Markdown. El objeto debe tener exactamente estas claves:

{
  "Pregunta": "Texto de la pregunta clara y concisa.",
  "Codigo": "Fragmento de código Python válido, autocontenible y bien formateado.",
  "Respuestas": ["Respuesta A", "Respuesta B", "Respuesta C", "Respuesta D"],
  "Respuesta correcta": "Respuesta correcta exactamente igual a una de las opciones",
  "Explicacion": "Explicación breve y genérica de por qué la respuesta correcta es la correcta, sin hacer referencia a la opción elegida por el usuario, sino explicando el razonamiento o el resultado del código."
}

Recuerda: responde SOLO con el objeto JSON, sin bloques de código, sin explicaciones y sin texto adicional. El código debe ser válido y ejecutable en Python, usando la sintaxis de la última versión y buenas prácticas de programación. Si tienes dudas sobre la salida, analiza el código paso a paso antes de responder.
"#;

const KEY_PROMPT: &str = "Pregunta";
const KEY_CODE: &str = "Codigo";
const KEY_OPTIONS: &str = "Respuestas";
const KEY_CORRECT: &str = "Respuesta correcta";
const KEY_EXPLANATION: &str = "Explicacion";

/// Outcome of one model call that reached the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Question(QuestionRecord),
    Malformed(ErrorRecord),
}

pub struct QuestionGenerator {
    model: Arc<dyn ModelClient>,
}

impl QuestionGenerator {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Ask the model for one question.
    ///
    /// Only transport and API failures come back as `Err`; an unusable reply
    /// is reported as [`Generation::Malformed`].
    pub async fn generate(&self) -> Result<Generation, ModelError> {
        let text = self.model.generate_content(QUESTION_PROMPT).await?;
        let generation = parse_reply(&text);
        if let Generation::Malformed(ref record) = generation {
            debug!("Unusable model reply: {}", record.detail);
        }
        Ok(generation)
    }

    pub fn is_quota_exhausted(&self, error_text: &str) -> bool {
        self.model.is_quota_exhausted(error_text)
    }
}

pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text
}

pub fn parse_reply(text: &str) -> Generation {
    let cleaned = strip_code_fence(text);

    let object = match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Generation::Malformed(ErrorRecord::new(
                format!("expected a JSON object, got {}", json_type(&other)),
                text,
            ))
        }
        Err(e) => return Generation::Malformed(ErrorRecord::new(e.to_string(), text)),
    };

    Generation::Question(QuestionRecord {
        prompt: text_field(&object, KEY_PROMPT),
        code: text_field(&object, KEY_CODE),
        options: options_field(object.get(KEY_OPTIONS)),
        correct_answer: text_field(&object, KEY_CORRECT),
        explanation: text_field(&object, KEY_EXPLANATION).unwrap_or_default(),
    })
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// Models sometimes answer "A, B, C, D" instead of an array.
fn options_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(joined)) => joined.split(',').map(|s| s.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| as_text(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::testing::{quota_error, ScriptedModel, VALID_REPLY};
    use pretty_assertions::assert_eq;

    fn question(generation: Generation) -> QuestionRecord {
        match generation {
            Generation::Question(record) => record,
            Generation::Malformed(error) => panic!("unexpected malformed reply: {:?}", error),
        }
    }

    #[test]
    fn maps_the_five_keys() {
        let record = question(parse_reply(VALID_REPLY));
        assert_eq!(
            record,
            QuestionRecord::new(
                "¿Qué imprime print(1+1)?",
                "print(1+1)",
                vec!["1".into(), "2".into(), "3".into(), "4".into()],
                "2",
                "1 + 1 es 2.",
            )
        );
    }

    #[test]
    fn fenced_reply_parses_like_unfenced() {
        let fenced = format!("```json\n{}\n```", VALID_REPLY);
        assert_eq!(parse_reply(&fenced), parse_reply(VALID_REPLY));

        let bare_fence = format!("```\n{}\n```", VALID_REPLY);
        assert_eq!(parse_reply(&bare_fence), parse_reply(VALID_REPLY));
    }

    #[test]
    fn strip_code_fence_only_removes_markers() {
        assert_eq!(strip_code_fence("  ```json{\"a\": 1}```  "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("{\"a\": \"```\"}"), "{\"a\": \"```\"}");
    }

    #[test]
    fn comma_joined_answers_are_split() {
        let reply = r#"{"Pregunta": "p", "Codigo": "c", "Respuestas": "A, B, C, D", "Respuesta correcta": "B"}"#;
        let record = question(parse_reply(reply));
        assert_eq!(record.options, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn answers_of_another_type_become_empty() {
        let reply = r#"{"Pregunta": "p", "Codigo": "c", "Respuestas": 4}"#;
        assert!(question(parse_reply(reply)).options.is_empty());
    }

    #[test]
    fn missing_keys_stay_absent() {
        let record = question(parse_reply(r#"{"Pregunta": "p"}"#));
        assert_eq!(record.prompt.as_deref(), Some("p"));
        assert_eq!(record.code, None);
        assert_eq!(record.correct_answer, None);
        assert_eq!(record.explanation, "");
        assert!(!record.is_cacheable());
    }

    #[test]
    fn non_string_scalars_keep_their_json_text() {
        let reply = r#"{"Pregunta": "p", "Codigo": "c", "Respuestas": [1, 2, 3, 4], "Respuesta correcta": 2}"#;
        let record = question(parse_reply(reply));
        assert_eq!(record.options, vec!["1", "2", "3", "4"]);
        assert_eq!(record.correct_answer.as_deref(), Some("2"));
    }

    #[test]
    fn null_answers_keep_their_position() {
        let reply = r#"{"Pregunta": "p", "Codigo": "c", "Respuestas": ["A", null, "C", "D"], "Respuesta correcta": "C"}"#;
        let record = question(parse_reply(reply));
        assert_eq!(record.options, vec!["A", "", "C", "D"]);
        assert_eq!(record.options[2], "C");
    }

    #[test]
    fn invalid_json_becomes_error_record() {
        let reply = "Claro, aquí tienes tu pregunta: {";
        match parse_reply(reply) {
            Generation::Malformed(error) => {
                assert_eq!(error.raw, reply);
                assert!(!error.detail.is_empty());
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn top_level_array_is_malformed() {
        match parse_reply("[1, 2]") {
            Generation::Malformed(error) => assert!(error.detail.contains("an array")),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn empty_reply_is_malformed() {
        assert!(matches!(parse_reply(""), Generation::Malformed(_)));
    }

    #[tokio::test]
    async fn generate_parses_model_reply() {
        let generator = QuestionGenerator::new(Arc::new(ScriptedModel::repeating(VALID_REPLY)));
        let record = question(generator.generate().await.unwrap());
        assert_eq!(record.correct_answer.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn generate_returns_upstream_errors() {
        let generator = QuestionGenerator::new(Arc::new(ScriptedModel::new(vec![Err(quota_error())])));
        let error = generator.generate().await.unwrap_err();
        assert!(generator.is_quota_exhausted(&error.to_string()));
    }
}
