use serde::{Deserialize, Serialize};

use super::version::Game;

/// Which streams an export run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationTarget {
    /// Geometry and animation in the scene file.
    #[default]
    AllNif,
    /// Geometry only, controllers are not exported.
    GeometryOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub game: Game,
    /// Packed file version used instead of the game's default.
    pub version_override: Option<u32>,
    pub scale_correction: f32,
    pub epsilon: f32,
    pub optimize_materials: bool,
    pub force_dds: bool,
    pub animation: AnimationTarget,
    pub bs_animation_node: bool,
    /// Also write a keyframe-only `.kf` stream next to the scene file.
    pub export_kf: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            game: Game::Unknown,
            version_override: None,
            scale_correction: 1.0,
            epsilon: 0.005,
            optimize_materials: true,
            force_dds: false,
            animation: AnimationTarget::AllNif,
            bs_animation_node: false,
            export_kf: false,
        }
    }
}

impl ExportConfig {
    pub fn for_game(game: Game) -> Self {
        ExportConfig {
            game,
            ..Default::default()
        }
    }

    /// True when the configured correction differs from 1 by more than epsilon.
    pub fn needs_scale_correction(&self) -> bool {
        (1.0 - self.scale_correction).abs() > self.epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ExportConfig = serde_json::from_str(r#"{ "game": "oblivion" }"#).unwrap();
        assert_eq!(config.game, Game::Oblivion);
        assert_eq!(config.scale_correction, 1.0);
        assert!(config.optimize_materials);
        assert!(!config.needs_scale_correction());
    }

    #[test]
    fn small_corrections_are_ignored() {
        let mut config = ExportConfig::for_game(Game::Morrowind);
        config.scale_correction = 1.004;
        assert!(!config.needs_scale_correction());
        config.scale_correction = 0.1;
        assert!(config.needs_scale_correction());
    }
}
