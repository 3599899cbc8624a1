use thiserror::Error;

/// El resolvedor no pudo producir un item reproducible.
///
/// Se reporta al autor del comando; la cola del guild no se toca.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no se encontró nada para `{0}`")]
    NotFound(String),

    #[error("el extractor falló: {0}")]
    Extractor(String),

    #[error("el extractor tardó más de {0}s")]
    Timeout(u64),

    #[error("respuesta inválida del extractor: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no se pudo ejecutar el extractor: {0}")]
    Io(#[from] std::io::Error),
}

/// Falló la apertura perezosa del stream al momento de reproducir.
///
/// Se notifica al canal y la cola avanza al siguiente item.
#[derive(Debug, Error)]
pub enum StreamOpenError {
    #[error("el extractor no devolvió URL de stream para `{0}`")]
    NoStreamUrl(String),

    #[error("el extractor falló: {0}")]
    Extractor(String),

    #[error("no se pudo ejecutar el extractor: {0}")]
    Io(#[from] std::io::Error),
}

/// La conexión de voz no es utilizable; dispara el teardown del guild.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("no se pudo conectar al canal de voz: {0}")]
    Connect(String),
}

/// Por qué terminó el run-loop de un guild.
///
/// `IdleTimeout` no es un error para el usuario: es el disparador normal de
/// limpieza cuando la cola queda vacía durante la ventana de inactividad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReason {
    IdleTimeout,
    Requested,
    SinkFailed(String),
}

impl std::fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownReason::IdleTimeout => write!(f, "inactividad"),
            TeardownReason::Requested => write!(f, "solicitud explícita"),
            TeardownReason::SinkFailed(why) => write!(f, "fallo de la conexión de voz: {}", why),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ResolutionError::NotFound("xyz".into());
        assert_eq!(err.to_string(), "no se encontró nada para `xyz`");

        let err = SinkError::Connect("timeout".into());
        assert_eq!(err.to_string(), "no se pudo conectar al canal de voz: timeout");

        let reason = TeardownReason::SinkFailed("udp".into());
        assert!(reason.to_string().contains("udp"));
    }
}
