use thiserror::Error;

/// Tipo de proveedor requerido por un comando
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Search,
    Lyrics,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Search => f.write_str("search"),
            ProviderKind::Lyrics => f.write_str("lyrics"),
        }
    }
}

/// Error de la cola de reproducción.
///
/// Todos los comandos de la cola devuelven este tipo. Los mensajes de los
/// colaboradores (yt-dlp, ffmpeg, el gateway de voz) se guardan tal cual como
/// texto, así el mismo valor vuelve al llamador y se difunde como
/// [`QueueEvent::Error`](crate::audio::registry::QueueEvent::Error).
///
/// Las variantes se agrupan en cuatro clases de fallo:
///
/// - **Configuración**: [`PlayerError::MissingProvider`]. La cola queda intacta.
/// - **Resolución**: [`PlayerError::Resolution`], [`PlayerError::Search`].
/// - **Stream/proceso**: [`PlayerError::Stream`], [`PlayerError::Connection`].
/// - **Política**: [`PlayerError::AutoplayExhausted`].
///
/// Los fallos de resolución, stream y política durante un reinicio son fatales:
/// la cola se destruye antes de reportar el error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
    #[error("No se encontró el proveedor de {0} requerido")]
    MissingProvider(ProviderKind),

    #[error("No se pudo resolver la fuente de audio: {0}")]
    Resolution(String),

    #[error("La búsqueda falló: {0}")]
    Search(String),

    #[error("La búsqueda de letras falló: {0}")]
    Lyrics(String),

    #[error("Error en el stream de audio: {0}")]
    Stream(String),

    #[error("Error en la conexión de voz: {0}")]
    Connection(String),

    #[error("No hay canciones recomendadas para continuar la reproducción")]
    AutoplayExhausted,

    #[error("La cola ya fue destruida")]
    Destroyed,

    #[error("La cola está vacía")]
    EmptyQueue,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("Estado de reproducción inválido: {0}")]
    InvalidState(String),

    #[error("Modo de repetición inválido: {0}")]
    InvalidRepeatMode(i8),
}

impl PlayerError {
    /// Indica si el error obliga a destruir la cola
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlayerError::Resolution(_)
                | PlayerError::Search(_)
                | PlayerError::Stream(_)
                | PlayerError::Connection(_)
                | PlayerError::AutoplayExhausted
        )
    }

    pub(crate) fn resolution(err: anyhow::Error) -> Self {
        PlayerError::Resolution(format!("{err:#}"))
    }

    pub(crate) fn stream(err: anyhow::Error) -> Self {
        PlayerError::Stream(format!("{err:#}"))
    }

    pub(crate) fn connection(err: anyhow::Error) -> Self {
        PlayerError::Connection(format!("{err:#}"))
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_message_is_preserved() {
        let err = PlayerError::resolution(anyhow::anyhow!("no matching rendition").context("yt-dlp"));
        assert_eq!(
            err.to_string(),
            "No se pudo resolver la fuente de audio: yt-dlp: no matching rendition"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_configuration_errors_are_not_fatal() {
        assert!(!PlayerError::MissingProvider(ProviderKind::Lyrics).is_fatal());
        assert!(!PlayerError::EmptyQueue.is_fatal());
        assert_eq!(
            PlayerError::MissingProvider(ProviderKind::Search).to_string(),
            "No se encontró el proveedor de search requerido"
        );
    }
}
