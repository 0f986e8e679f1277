use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use tracing::{debug, info};

use crate::error::PlayerError;
use crate::sources::Track;

/// Modo de repetición aplicado al terminar cada canción
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    Track,
    Queue,
    Autoplay,
}

impl TryFrom<i8> for RepeatMode {
    type Error = PlayerError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(RepeatMode::None),
            0 => Ok(RepeatMode::Track),
            1 => Ok(RepeatMode::Queue),
            2 => Ok(RepeatMode::Autoplay),
            other => Err(PlayerError::InvalidRepeatMode(other)),
        }
    }
}

impl From<RepeatMode> for i8 {
    fn from(mode: RepeatMode) -> Self {
        match mode {
            RepeatMode::None => -1,
            RepeatMode::Track => 0,
            RepeatMode::Queue => 1,
            RepeatMode::Autoplay => 2,
        }
    }
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RepeatMode::None => "Desactivado",
            RepeatMode::Track => "Canción",
            RepeatMode::Queue => "Cola",
            RepeatMode::Autoplay => "Autoplay",
        };
        f.write_str(label)
    }
}

/// Lista de canciones de una guild con cursor e historial.
///
/// Mientras la lista no esté vacía el cursor apunta a una entrada válida.
/// Agregar nunca reordena las entradas existentes y el historial solo crece
/// hasta que se suelta la cola dueña.
#[derive(Debug, Default, Clone)]
pub struct TrackList {
    tracks: Vec<Track>,
    history: Vec<Track>,
    cursor: usize,
}

impl TrackList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega tracks al final marcándolos con quien los pidió
    pub fn append(&mut self, requester: UserId, tracks: Vec<Track>) -> Vec<Track> {
        let added: Vec<Track> = tracks
            .into_iter()
            .map(|track| track.with_requested_by(requester))
            .collect();

        self.tracks.extend(added.iter().cloned());
        info!("➕ Agregadas {} canciones a la cola", added.len());

        added
    }

    /// Avanza el cursor con vuelta al inicio
    pub fn advance(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        self.cursor = (self.cursor + 1) % self.tracks.len();
        debug!("➡️ Cursor en {}", self.cursor);
    }

    /// Retrocede el cursor con vuelta al final
    pub fn retreat(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        self.cursor = (self.cursor + self.tracks.len() - 1) % self.tracks.len();
        debug!("⬅️ Cursor en {}", self.cursor);
    }

    /// Avanza sin vuelta; devuelve `false` si no hay siguiente canción
    pub fn step_forward(&mut self) -> bool {
        if self.cursor + 1 < self.tracks.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Mezcla todo excepto la primera posición
    pub fn shuffle(&mut self) {
        if self.tracks.len() <= 2 {
            return;
        }

        let front = self.tracks.remove(0);
        self.tracks.shuffle(&mut rand::thread_rng());
        self.tracks.insert(0, front);

        info!("🔀 Cola mezclada");
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.cursor)
    }

    /// Registra en el historial salvo que repita la última entrada
    pub fn record_history(&mut self, track: &Track) {
        if self.history.last().is_some_and(|last| last.same_as(track)) {
            return;
        }
        self.history.push(track.clone());
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Canciones pendientes después del cursor
    pub fn upcoming(&self) -> &[Track] {
        self.tracks.get(self.cursor + 1..).unwrap_or(&[])
    }

    /// Duración total en segundos
    pub fn total_duration(&self) -> u64 {
        self.tracks.iter().map(|t| t.duration.value).sum()
    }
}

/// Página de canciones pendientes para mostrar en Discord
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl QueuePage {
    /// Obtiene una página específica de las canciones pendientes
    pub fn of(upcoming: &[Track], page: usize, items_per_page: usize) -> Self {
        let items_per_page = items_per_page.max(1);
        let total_items = upcoming.len();
        let total_pages = total_items.div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        Self {
            items: upcoming.get(start..end).unwrap_or(&[]).to_vec(),
            offset: start,
            current_page,
            total_pages,
            total_items,
        }
    }
}
