use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub generator: Option<GeneratorConfig>,
    pub network: Option<NetworkConfig>,
    pub limits: Option<LimitsConfig>,
    pub artifacts: Option<ArtifactsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub google_api_key: Option<String>,
    pub s2_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// `gemini` or `ollama`.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub format_model: Option<String>,
    pub ollama_endpoint: Option<String>,
    pub schema_output: Option<bool>,
    pub response_language: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub fetch_timeout_secs: Option<u64>,
    pub archive_lookup_timeout_secs: Option<u64>,
    pub archive_fetch_timeout_secs: Option<u64>,
    pub index_timeout_secs: Option<u64>,
    pub max_download_mb: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub summary_char_limit: Option<usize>,
    pub chat_char_limit: Option<usize>,
    pub max_document_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub dir: Option<String>,
    pub compiler: Option<String>,
    pub compiler_args: Option<Vec<String>>,
    pub compile_timeout_secs: Option<u64>,
}

/// Platform config directory path: `<config_dir>/researchflow/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("researchflow").join("config.toml"))
}

/// Load config by cascading CWD `.researchflow.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".researchflow.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// The overlay's value if set, else the base's.
fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (ob, bb) = (&overlay.api_keys, &base.api_keys);
    let api_keys = ApiKeysConfig {
        google_api_key: pick(ob, bb, |a| a.google_api_key.clone()),
        s2_api_key: pick(ob, bb, |a| a.s2_api_key.clone()),
    };

    let (og, bg) = (&overlay.generator, &base.generator);
    let generator = GeneratorConfig {
        provider: pick(og, bg, |g| g.provider.clone()),
        model: pick(og, bg, |g| g.model.clone()),
        format_model: pick(og, bg, |g| g.format_model.clone()),
        ollama_endpoint: pick(og, bg, |g| g.ollama_endpoint.clone()),
        schema_output: pick(og, bg, |g| g.schema_output),
        response_language: pick(og, bg, |g| g.response_language.clone()),
        timeout_secs: pick(og, bg, |g| g.timeout_secs),
    };

    let (on, bn) = (&overlay.network, &base.network);
    let network = NetworkConfig {
        fetch_timeout_secs: pick(on, bn, |n| n.fetch_timeout_secs),
        archive_lookup_timeout_secs: pick(on, bn, |n| n.archive_lookup_timeout_secs),
        archive_fetch_timeout_secs: pick(on, bn, |n| n.archive_fetch_timeout_secs),
        index_timeout_secs: pick(on, bn, |n| n.index_timeout_secs),
        max_download_mb: pick(on, bn, |n| n.max_download_mb),
    };

    let (ol, bl) = (&overlay.limits, &base.limits);
    let limits = LimitsConfig {
        summary_char_limit: pick(ol, bl, |l| l.summary_char_limit),
        chat_char_limit: pick(ol, bl, |l| l.chat_char_limit),
        max_document_chars: pick(ol, bl, |l| l.max_document_chars),
    };

    let (oa, ba) = (&overlay.artifacts, &base.artifacts);
    let artifacts = ArtifactsConfig {
        dir: pick(oa, ba, |a| a.dir.clone()),
        compiler: pick(oa, ba, |a| a.compiler.clone()),
        compiler_args: pick(oa, ba, |a| a.compiler_args.clone()),
        compile_timeout_secs: pick(oa, ba, |a| a.compile_timeout_secs),
    };

    ConfigFile {
        api_keys: Some(api_keys),
        generator: Some(generator),
        network: Some(network),
        limits: Some(limits),
        artifacts: Some(artifacts),
    }
}

impl ConfigFile {
    /// Copy every value set in this file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(keys) = &self.api_keys {
            set_opt(&mut config.google_api_key, &keys.google_api_key);
            set_opt(&mut config.s2_api_key, &keys.s2_api_key);
        }
        if let Some(generator) = &self.generator {
            if let Some(provider) = &generator.provider {
                match provider.parse() {
                    Ok(p) => config.provider = p,
                    Err(e) => tracing::warn!(error = %e, "ignoring provider from config file"),
                }
            }
            set(&mut config.model, &generator.model);
            set(&mut config.format_model, &generator.format_model);
            set(&mut config.ollama_endpoint, &generator.ollama_endpoint);
            set(&mut config.schema_output, &generator.schema_output);
            set(&mut config.response_language, &generator.response_language);
            set(&mut config.generator_timeout_secs, &generator.timeout_secs);
        }
        if let Some(network) = &self.network {
            set(&mut config.fetch_timeout_secs, &network.fetch_timeout_secs);
            set(
                &mut config.archive_lookup_timeout_secs,
                &network.archive_lookup_timeout_secs,
            );
            set(
                &mut config.archive_fetch_timeout_secs,
                &network.archive_fetch_timeout_secs,
            );
            set(&mut config.index_timeout_secs, &network.index_timeout_secs);
            if let Some(mb) = network.max_download_mb {
                config.max_download_bytes = mb.saturating_mul(1024 * 1024);
            }
        }
        if let Some(limits) = &self.limits {
            set(&mut config.summary_char_limit, &limits.summary_char_limit);
            set(&mut config.chat_char_limit, &limits.chat_char_limit);
            set(&mut config.max_document_chars, &limits.max_document_chars);
        }
        if let Some(artifacts) = &self.artifacts {
            if let Some(dir) = &artifacts.dir {
                config.artifact_dir = PathBuf::from(dir);
            }
            set(&mut config.compiler_program, &artifacts.compiler);
            set(&mut config.compiler_args, &artifacts.compiler_args);
            set(&mut config.compile_timeout_secs, &artifacts.compile_timeout_secs);
        }
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provider;

    #[test]
    fn partial_file_parses() {
        let toml_str = "[generator]\nprovider = \"ollama\"\nmodel = \"llama3\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let generator = parsed.generator.unwrap();
        assert_eq!(generator.model.as_deref(), Some("llama3"));
        assert!(generator.format_model.is_none());
        assert!(parsed.api_keys.is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            generator: Some(GeneratorConfig {
                model: Some("base-model".into()),
                response_language: Some("English".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            generator: Some(GeneratorConfig {
                model: Some("overlay-model".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let generator = merged.generator.unwrap();
        assert_eq!(generator.model.as_deref(), Some("overlay-model"));
        assert_eq!(generator.response_language.as_deref(), Some("English"));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            artifacts: Some(ArtifactsConfig {
                dir: Some("/base/out".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.artifacts.unwrap().dir.as_deref(), Some("/base/out"));
    }

    #[test]
    fn apply_to_overrides_only_set_values() {
        let file: ConfigFile = toml::from_str(
            r#"
            [api_keys]
            s2_api_key = "s2"

            [generator]
            provider = "ollama"
            schema_output = false

            [network]
            max_download_mb = 5

            [artifacts]
            dir = "/tmp/out"
            compiler_args = ["-interaction=batchmode"]
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config.s2_api_key.as_deref(), Some("s2"));
        assert!(config.google_api_key.is_none());
        assert_eq!(config.provider, Provider::Ollama);
        assert!(!config.schema_output);
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.max_download_bytes, 5 * 1024 * 1024);
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.compiler_program, "pdflatex");
        assert_eq!(config.compiler_args, vec!["-interaction=batchmode"]);
    }

    #[test]
    fn bad_provider_is_ignored() {
        let file: ConfigFile = toml::from_str("[generator]\nprovider = \"gpt\"\n").unwrap();
        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config.provider, Provider::Gemini);
    }

    #[test]
    fn load_from_path_handles_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[generator\nmodel = ").unwrap();
        assert!(load_from_path(&broken).is_none());

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[limits]\nchat_char_limit = 1000\n").unwrap();
        let parsed = load_from_path(&good).unwrap();
        assert_eq!(parsed.limits.unwrap().chat_char_limit, Some(1000));
    }
}
