//! Starter questions shown when a chat session opens.

use serde::{Deserialize, Serialize};

/// A labeled question the boundary renders as a chat-start shortcut.
/// Selecting one submits `message` as ordinary user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarterQuestion {
    pub label: String,
    pub message: String,
}

impl StarterQuestion {
    pub fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
        }
    }
}

/// The built-in corporate-policy starters.
pub fn default_starters() -> Vec<StarterQuestion> {
    vec![
        StarterQuestion::new(
            "Comité de Integridad",
            "¿Quiénes conforman el comité de integridad?",
        ),
        StarterQuestion::new(
            "Política de Regalos",
            "¿Qué hago en caso de recibir un regalo?",
        ),
        StarterQuestion::new(
            "Canal de Denuncias",
            "¿Cómo puedo hacer una denuncia anónima y qué información debo proporcionar?",
        ),
        StarterQuestion::new(
            "Conflictos de Interés",
            "¿Qué situaciones se consideran conflicto de interés y cómo debo reportarlas?",
        ),
    ]
}
