//! Harness description: the control table, per-frame options and where the
//! shader sources come from.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::controls::ControlSpec;
use crate::error::{ConfigError, RegistryError};
use crate::gpu::reflect::ShaderLanguage;
use crate::gpu::Topology;
use crate::render::RenderOptions;
use crate::shaders::ShaderSources;
use crate::vector::Vector3;

/// The control table of the lighting shader, on a 0-255 scale.
pub fn default_controls() -> Vec<ControlSpec> {
    vec![
        ControlSpec::new("uLightAmb", "Light: Ambient", Vector3::splat(12.75)),
        ControlSpec::new("uLightDiff", "Light: Diffuse", Vector3::new(127.5, 204.0, 25.1)),
        ControlSpec::new("uSphereAmb", "Sphere: Ambient", Vector3::new(204.0, 204.0, 255.0)),
        ControlSpec::new("uSphereDiff", "Sphere: Diffuse", Vector3::splat(255.0)),
    ]
}

/// Which embedded shader pair to use when no files are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderVariant {
    #[default]
    Lighting,
    Solid,
}

impl ShaderVariant {
    pub fn sources(self, language: ShaderLanguage) -> ShaderSources {
        match (self, language) {
            (ShaderVariant::Lighting, ShaderLanguage::Glsl) => ShaderSources::glsl_lighting(),
            (ShaderVariant::Lighting, ShaderLanguage::Wgsl) => ShaderSources::wgsl_lighting(),
            (ShaderVariant::Solid, ShaderLanguage::Glsl) => ShaderSources::glsl_solid(),
            (ShaderVariant::Solid, ShaderLanguage::Wgsl) => ShaderSources::wgsl_solid(),
        }
    }

    fn default_controls(self) -> Vec<ControlSpec> {
        match self {
            ShaderVariant::Lighting => default_controls(),
            ShaderVariant::Solid => Vec::new(),
        }
    }
}

impl FromStr for ShaderVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lighting" => Ok(ShaderVariant::Lighting),
            "solid" => Ok(ShaderVariant::Solid),
            other => Err(ConfigError::InvalidValue {
                what: "shader variant",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub controls: Vec<ControlSpec>,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default)]
    pub variant: ShaderVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shaders: Option<ShaderPaths>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            controls: default_controls(),
            render: RenderOptions::default(),
            variant: ShaderVariant::Lighting,
            shaders: None,
        }
    }
}

impl HarnessConfig {
    /// Fixed-color fragment shader and no controls.
    pub fn solid() -> Self {
        Self {
            controls: Vec::new(),
            variant: ShaderVariant::Solid,
            ..Self::default()
        }
    }

    /// Parses a `<harness>` document. Without any `<control>` elements the
    /// variant's default table is used.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        if !root.has_tag_name("harness") {
            return Err(ConfigError::UnexpectedRoot(root.tag_name().name().to_string()));
        }

        let variant = match root.attribute("variant") {
            Some(value) => value.trim().parse()?,
            None => ShaderVariant::default(),
        };

        let mut render = RenderOptions::default();
        if let Some(text) = optional_text(&root, "clear") {
            render.clear_color = parse_color(&text)?;
        }
        if let Some(text) = optional_text(&root, "topology") {
            render.topology = Topology::from_str(&text).map_err(|_| ConfigError::InvalidValue {
                what: "topology",
                value: text.clone(),
            })?;
        }

        let shaders = match root.children().find(|child| child.has_tag_name("shaders")) {
            Some(node) => Some(ShaderPaths {
                vertex: required_attribute(&node, "shaders", "vertex")?.into(),
                fragment: required_attribute(&node, "shaders", "fragment")?.into(),
            }),
            None => None,
        };

        let mut controls = Vec::new();
        for node in root.children().filter(|child| child.has_tag_name("control")) {
            let uniform_name = required_attribute(&node, "control", "uniform")?;
            let label = node
                .attribute("label")
                .map_or_else(|| uniform_name.clone(), str::to_string);
            let default_value = parse_vec3(node.text().unwrap_or_default())?;
            controls.push(ControlSpec::new(uniform_name, label, default_value));
        }
        if controls.is_empty() {
            controls = variant.default_controls();
        }
        check_unique(&controls)?;

        Ok(Self {
            controls,
            render,
            variant,
            shaders,
        })
    }

    /// Reads a harness file. Shader paths are taken relative to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_xml(&xml)?;
        if let (Some(shaders), Some(base)) = (config.shaders.as_mut(), path.parent()) {
            shaders.vertex = base.join(&shaders.vertex);
            shaders.fragment = base.join(&shaders.fragment);
        }
        Ok(config)
    }

    /// Sources named by the config, or the embedded pair for `language`.
    pub fn shader_sources(&self, language: ShaderLanguage) -> Result<ShaderSources, ConfigError> {
        match &self.shaders {
            Some(paths) => ShaderSources::read(paths),
            None => Ok(self.variant.sources(language)),
        }
    }
}

fn check_unique(controls: &[ControlSpec]) -> Result<(), RegistryError> {
    for (index, control) in controls.iter().enumerate() {
        if controls[..index]
            .iter()
            .any(|earlier| earlier.uniform_name == control.uniform_name)
        {
            return Err(RegistryError::DuplicateUniform(control.uniform_name.clone()));
        }
    }
    Ok(())
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn required_attribute(
    node: &Node<'_, '_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, ConfigError> {
    node.attribute(attribute)
        .map(str::to_string)
        .ok_or(ConfigError::MissingAttribute { element, attribute })
}

fn parse_floats<const N: usize>(text: &str, what: &'static str) -> Result<[f32; N], ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        what,
        value: text.trim().to_string(),
    };
    let mut values = [0.0; N];
    let mut parts = text.split_whitespace();
    for slot in &mut values {
        *slot = parts
            .next()
            .and_then(|part| part.parse::<f32>().ok())
            .filter(|value| value.is_finite())
            .ok_or_else(invalid)?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(values)
}

fn parse_vec3(text: &str) -> Result<Vector3, ConfigError> {
    parse_floats::<3>(text, "control value").map(Vector3::from_array)
}

fn parse_color(text: &str) -> Result<[f32; 4], ConfigError> {
    parse_floats::<4>(text, "clear color")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
        <harness>
            <clear>0.1 0.2 0.3 1</clear>
            <topology>triangles</topology>
            <control uniform="uTint" label="Tint">10 20 30</control>
            <control uniform="uGlow">0 0 255</control>
        </harness>
    "#;

    #[test]
    fn parses_sample_document() {
        let config = HarnessConfig::from_xml(SAMPLE).unwrap();
        assert_eq!(config.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.render.topology, Topology::Triangles);
        assert_eq!(config.controls.len(), 2);
        assert_eq!(config.controls[0].label, "Tint");
        assert_eq!(config.controls[1].label, "uGlow");
        assert_eq!(config.controls[1].default_value, Vector3::new(0.0, 0.0, 255.0));
        assert!(config.shaders.is_none());
    }

    #[test]
    fn empty_document_uses_default_table() {
        let config = HarnessConfig::from_xml("<harness/>").unwrap();
        assert_eq!(config, HarnessConfig::default());

        let solid = HarnessConfig::from_xml(r#"<harness variant="solid"/>"#).unwrap();
        assert_eq!(solid, HarnessConfig::solid());
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(
            HarnessConfig::from_xml("<scene/>"),
            Err(ConfigError::UnexpectedRoot(root)) if root == "scene"
        ));
        assert!(matches!(
            HarnessConfig::from_xml("<harness><control>1 2 3</control></harness>"),
            Err(ConfigError::MissingAttribute { attribute: "uniform", .. })
        ));
        assert!(matches!(
            HarnessConfig::from_xml(r#"<harness><control uniform="u">1 2</control></harness>"#),
            Err(ConfigError::InvalidValue { what: "control value", .. })
        ));
        assert!(matches!(
            HarnessConfig::from_xml("<harness><topology>fan</topology></harness>"),
            Err(ConfigError::InvalidValue { what: "topology", .. })
        ));
        assert!(matches!(
            HarnessConfig::from_xml("<harness>"),
            Err(ConfigError::Xml(_))
        ));
    }

    #[test]
    fn duplicate_controls_are_rejected() {
        let xml = r#"<harness>
            <control uniform="uA">1 1 1</control>
            <control uniform="uA">2 2 2</control>
        </harness>"#;
        assert!(matches!(
            HarnessConfig::from_xml(xml),
            Err(ConfigError::Registry(RegistryError::DuplicateUniform(name))) if name == "uA"
        ));
    }

    #[test]
    fn shader_paths_resolve_next_to_the_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("quad.vert"), crate::shaders::QUAD_VERT_GLSL).unwrap();
        fs::write(dir.path().join("flat.frag"), crate::shaders::SOLID_FRAG_GLSL).unwrap();

        let harness = dir.path().join("harness.xml");
        let mut file = fs::File::create(&harness).unwrap();
        write!(
            file,
            r#"<harness><shaders vertex="quad.vert" fragment="flat.frag"/></harness>"#
        )
        .unwrap();

        let config = HarnessConfig::load(&harness).unwrap();
        let shaders = config.shaders.as_ref().unwrap();
        assert_eq!(shaders.vertex, dir.path().join("quad.vert"));
        assert_eq!(
            config.shader_sources(ShaderLanguage::Glsl).unwrap(),
            ShaderSources::glsl_solid()
        );
    }

    #[test]
    fn embedded_sources_follow_variant() {
        let config = HarnessConfig::solid();
        assert_eq!(
            config.shader_sources(ShaderLanguage::Wgsl).unwrap(),
            ShaderSources::wgsl_solid()
        );
    }
}
