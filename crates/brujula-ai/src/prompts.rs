//! Prompt template registry.
//!
//! Three fixed templates drive every model interaction: the RAG system
//! prompt (slot `summary`), the follow-up question prompt (slots
//! `user_input`, `bot_response`) and the summarization prompt (slot
//! `conversation`). Rendering a template without one of its slots is an
//! error, never a silent blank.

use tera::{Context, Tera};

use crate::error::Result;

/// System prompt for grounded answers over the policy corpus.
pub const RAG_PROMPT: &str = "\
Eres un asistente virtual diseñado para apoyar a los empleados en sus consultas sobre reglamentos, políticas empresariales, procedimientos internos y otros documentos corporativos relevantes. Estás programado para responder preguntas dentro de estos temas, usando fuentes específicas de información autorizada por la empresa.

Sigue estos pasos:
Comprensión de la Pregunta: Analiza la consulta del usuario y verifica que esté relacionada con la empresa y su entorno corporativo. Si no es así, responde cortésmente que solo puedes asistir con temas vinculados a la empresa.
Evaluación: Determina cuál de las herramientas o fuentes disponibles te permitirá obtener la información necesaria de manera eficiente y precisa.
Búsqueda de Información: Accede a las fuentes autorizadas para encontrar respuestas claras y relevantes.
Generación de Respuesta: Si encuentras la información necesaria, crea una respuesta formal y amigable en un tono profesional y conversacional.
Búsqueda Adicional: Si no hay suficiente información, intenta acceder a recursos adicionales para proporcionar una respuesta completa.
Respuesta Final: Ofrece una respuesta útil, clara y bien estructurada, manteniendo siempre un tono formal y acogedor. Siempre incluye el nombre del documento de donde proviene la información. Entrega el nombre del documento tal como aparece en la fuente original sin modificarlo aunque contenga errores tipográficos.

Considera lo siguiente:
Formato y Tono: Presenta las respuestas usando Markdown para una fácil lectura y mantén siempre un tono formal y profesional.
Relevancia: Ignora preguntas fuera del ámbito de la empresa y sus políticas internas.
Recuerda NO CORREGIR errores en los nombres de los documentos. Inclúyelos tal como aparecen en la fuente original.

Resumen de la conversación anterior:
{{ summary }}
";

/// Prompt asking the model for the user's likely next question.
pub const Q_SUGGESTION_PROMPT: &str = "\
Imagina que estás escuchando una conversación entre un usuario y un asistente virtual de la empresa. A continuación, verás un fragmento de esa conversación.
Tu misión es pensar en la próxima pregunta que el usuario podría hacer basándote en el contexto de la conversación. Asegúrate de que tu pregunta sea relevante y ayude a profundizar en el tema que se está discutiendo.
Genera y retorna solo la pregunta, sin incluir la respuesta del chatbot. Prioriza preguntas sobre términos específicos, detalles o información adicional que el usuario podría necesitar.
Aquí tienes la conversación:

<conversacion>
USUARIO: {{ user_input }}

BOT: {{ bot_response }}
</conversacion>

Basándote en esto, ¿cuál crees que sería la próxima pregunta del usuario?
";

/// Prompt compacting a transcript into a rolling summary.
pub const SUMMARY_PROMPT: &str = "\
Resume brevemente esta conversación, destacando:
- Los principales temas discutidos
- Las conclusiones importantes
- Sea conciso y claro

<conversacion>
{{ conversation }}
</conversacion>
";

/// Literal used in the RAG prompt before any summarization has happened.
pub const NO_SUMMARY_PLACEHOLDER: &str = "No hay resumen previo.";

const RAG_TEMPLATE: &str = "rag";
const Q_SUGGESTION_TEMPLATE: &str = "q_suggestion";
const SUMMARY_TEMPLATE: &str = "summary";

/// Immutable registry of the three conversation prompt templates.
pub struct PromptRegistry {
    tera: Tera,
}

impl PromptRegistry {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (RAG_TEMPLATE, RAG_PROMPT),
            (Q_SUGGESTION_TEMPLATE, Q_SUGGESTION_PROMPT),
            (SUMMARY_TEMPLATE, SUMMARY_PROMPT),
        ])?;
        Ok(Self { tera })
    }

    /// Render a registered template with the given context.
    pub fn render(&self, template: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template, context)?)
    }

    /// Render the RAG system prompt with the current rolling summary.
    pub fn render_rag(&self, summary: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("summary", summary);
        self.render(RAG_TEMPLATE, &context)
    }

    /// Render the follow-up question prompt from the latest exchange.
    pub fn render_suggestion(&self, user_input: &str, bot_response: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("user_input", user_input);
        context.insert("bot_response", bot_response);
        self.render(Q_SUGGESTION_TEMPLATE, &context)
    }

    /// Render the summarization prompt over a formatted transcript.
    pub fn render_summary(&self, conversation: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("conversation", conversation);
        self.render(SUMMARY_TEMPLATE, &context)
    }
}
