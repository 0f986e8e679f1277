use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::transcode::IDENTITY_FILTER;

/// Filtro de audio con nombre (grafo de filtros de ffmpeg)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackFilter {
    pub name: String,
    pub value: String,
}

impl PlaybackFilter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

const PRESETS: &[(&str, &str)] = &[
    ("3D", "apulsator=hz=0.125"),
    ("bassboost", "bass=g=10,dynaudnorm=f=150:g=15"),
    ("echo", "aecho=0.8:0.9:1000:0.3"),
    ("fadein", "afade=t=in:ss=0:d=10"),
    ("flanger", "flanger"),
    ("gate", "agate"),
    ("haas", "haas"),
    ("karaoke", "stereotools=mlev=0.1"),
    ("nightcore", "asetrate=48000*1.25,aresample=48000,bass=g=5"),
    ("reverse", "areverse"),
    ("vaporwave", "asetrate=48000*0.8,aresample=48000,atempo=1.1"),
    ("mcompand", "mcompand"),
    ("phaser", "aphaser"),
    ("tremolo", "tremolo"),
    ("surround", "surround"),
    ("slowed", "asetrate=25000*1.25,aresample=50000,bass=g=2"),
    ("earwax", "earwax"),
    ("underwater", "aresample=5000"),
    ("clear", IDENTITY_FILTER),
];

/// Registro de filtros disponibles para `/filter`
pub struct FilterRegistry {
    filters: RwLock<Vec<PlaybackFilter>>,
}

impl FilterRegistry {
    /// Crea el registro con los presets incluidos
    pub fn new() -> Self {
        let filters = PRESETS
            .iter()
            .map(|(name, value)| PlaybackFilter::new(*name, *value))
            .collect();

        Self {
            filters: RwLock::new(filters),
        }
    }

    /// Registra filtros nuevos; uno con el mismo nombre se reemplaza
    pub fn register(&self, filters: impl IntoIterator<Item = PlaybackFilter>) {
        let mut registered = self.filters.write();
        for filter in filters {
            info!("🎛️ Filtro '{}' registrado", filter.name);
            match registered.iter_mut().find(|f| f.name == filter.name) {
                Some(existing) => *existing = filter,
                None => registered.push(filter),
            }
        }
    }

    /// Busca un filtro por nombre (sin distinguir mayúsculas)
    pub fn get(&self, name: &str) -> Option<PlaybackFilter> {
        self.filters
            .read()
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Elimina un filtro; devuelve `true` si existía
    pub fn unregister(&self, name: &str) -> bool {
        let mut registered = self.filters.write();
        let before = registered.len();
        registered.retain(|f| f.name != name);
        before != registered.len()
    }

    pub fn all(&self) -> Vec<PlaybackFilter> {
        self.filters.read().clone()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_presets_are_available() {
        let registry = FilterRegistry::new();
        assert_eq!(registry.all().len(), PRESETS.len());
        assert_eq!(
            registry.get("nightcore").map(|f| f.value),
            Some("asetrate=48000*1.25,aresample=48000,bass=g=5".to_string())
        );
        assert_eq!(registry.get("CLEAR").map(|f| f.value), Some("anull".to_string()));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = FilterRegistry::new();
        registry.register([
            PlaybackFilter::new("echo", "aecho=0.5:0.5:500:0.2"),
            PlaybackFilter::new("lofi", "lowpass=f=3000"),
        ]);

        assert_eq!(registry.all().len(), PRESETS.len() + 1);
        assert_eq!(
            registry.get("echo").map(|f| f.value),
            Some("aecho=0.5:0.5:500:0.2".to_string())
        );
    }

    #[test]
    fn test_unregister() {
        let registry = FilterRegistry::new();
        assert!(registry.unregister("3D"));
        assert!(!registry.unregister("3D"));
        assert!(registry.get("3D").is_none());
    }
}
