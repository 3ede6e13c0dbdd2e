use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::args::BaseArgs;

use super::Config;

const OVERRIDES_SOURCE: &str = "flags/environment";

/// One source of configuration values, in precedence order (lowest first).
#[derive(Debug)]
struct Layer {
    source: String,
    fields: Vec<(String, String)>,
}

impl Layer {
    fn from_config(source: String, config: &Config) -> Option<Self> {
        let fields: Vec<(String, String)> = config
            .non_empty_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        (!fields.is_empty()).then_some(Layer { source, fields })
    }
}

/// Values given on the command line or through `WANDB_*`/`WBACKUP_*` variables.
fn overrides(base: &BaseArgs) -> Config {
    Config {
        entity: base.entity.clone(),
        project: base.project.clone(),
        base_url: base.base_url.clone(),
        archive_dir: base
            .archive_dir
            .as_ref()
            .map(|dir| dir.display().to_string()),
        ..Default::default()
    }
}

fn relative_to_cwd(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn collect_layers(base: &BaseArgs, global: bool, local: bool) -> Vec<Layer> {
    let mut layers = Vec::new();

    if !local {
        if let Ok(path) = super::global_path() {
            layers.extend(Layer::from_config(
                path.display().to_string(),
                &super::load_file(&path),
            ));
        }
    }
    if !global {
        if let Some(path) = super::local_path() {
            layers.extend(Layer::from_config(
                relative_to_cwd(&path),
                &super::load_file(&path),
            ));
        }
    }
    if !global && !local {
        layers.extend(Layer::from_config(
            OVERRIDES_SOURCE.to_string(),
            &overrides(base),
        ));
    }
    layers
}

pub fn run(base: BaseArgs, global: bool, local: bool, verbose: bool) -> Result<()> {
    let layers = collect_layers(&base, global, local);
    let output = if verbose {
        format_layers(&layers, base.json)?
    } else {
        format_effective(&layers, base.json)?
    };

    if output.is_empty() {
        return Ok(());
    }
    if base.json || verbose {
        // json goes to stdout so it can be piped
        println!("{output}");
    } else {
        eprintln!("{output}");
    }
    Ok(())
}

/// Later layers win; keys keep the order of their first appearance.
fn effective_fields(layers: &[Layer]) -> Vec<(&str, &str)> {
    let mut fields: Vec<(&str, &str)> = Vec::new();
    for layer in layers {
        for (key, value) in &layer.fields {
            let (key, value) = (key.as_str(), value.as_str());
            match fields.iter().position(|(k, _)| *k == key) {
                Some(index) => fields[index].1 = value,
                None => fields.push((key, value)),
            }
        }
    }
    fields
}

fn format_effective(layers: &[Layer], json: bool) -> Result<String> {
    let fields = effective_fields(layers);
    if json {
        let map: Map<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        return Ok(serde_json::to_string(&map)?);
    }
    Ok(fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn format_layers(layers: &[Layer], json: bool) -> Result<String> {
    if json {
        let map: Map<String, Value> = layers
            .iter()
            .map(|layer| {
                let fields: Map<String, Value> = layer
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                (layer.source.clone(), Value::Object(fields))
            })
            .collect();
        return Ok(serde_json::to_string(&map)?);
    }

    Ok(layers
        .iter()
        .map(|layer| {
            let mut group = layer.source.clone();
            for (key, value) in &layer.fields {
                group.push_str(&format!("\n  {key}: {value}"));
            }
            group
        })
        .collect::<Vec<_>>()
        .join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(source: &str, fields: &[(&str, &str)]) -> Layer {
        Layer {
            source: source.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn empty_config_has_no_layer() {
        assert!(Layer::from_config("x".into(), &Config::default()).is_none());
    }

    #[test]
    fn layer_lists_known_keys_in_order() {
        let config = Config {
            archive_dir: Some("./data".into()),
            entity: Some("diliadis".into()),
            project: Some("mnist".into()),
            ..Default::default()
        };
        let layer = Layer::from_config("global".into(), &config).unwrap();
        let keys: Vec<_> = layer.fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["entity", "project", "archive_dir"]);
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let layers = vec![
            layer("global", &[("entity", "diliadis"), ("project", "mnist")]),
            layer(".wbackup/config.json", &[("project", "cifar")]),
            layer(OVERRIDES_SOURCE, &[("archive_dir", "/tmp/out")]),
        ];
        assert_eq!(
            format_effective(&layers, false).unwrap(),
            "entity: diliadis\nproject: cifar\narchive_dir: /tmp/out"
        );
        let parsed: Value = serde_json::from_str(&format_effective(&layers, true).unwrap()).unwrap();
        assert_eq!(parsed["project"], "cifar");
    }

    #[test]
    fn effective_json_of_nothing_is_empty_object() {
        assert_eq!(format_effective(&[], true).unwrap(), "{}");
    }

    #[test]
    fn layers_text_groups_by_source() {
        let layers = vec![
            layer("~/.config/wbackup/config.json", &[("entity", "global-entity")]),
            layer(".wbackup/config.json", &[("project", "local-proj")]),
        ];
        assert_eq!(
            format_layers(&layers, false).unwrap(),
            "~/.config/wbackup/config.json\n  entity: global-entity\n\n.wbackup/config.json\n  project: local-proj"
        );
    }

    #[test]
    fn layers_json_nested_by_source() {
        let layers = vec![layer(OVERRIDES_SOURCE, &[("entity", "team")])];
        let parsed: Value = serde_json::from_str(&format_layers(&layers, true).unwrap()).unwrap();
        assert_eq!(parsed[OVERRIDES_SOURCE]["entity"], "team");
        assert_eq!(format_layers(&[], true).unwrap(), "{}");
    }
}
