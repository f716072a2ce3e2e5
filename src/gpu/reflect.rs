//! Shader front end: rejects sources that would not compile and extracts
//! their attribute and uniform declarations.
//!
//! GLSL ES goes through the `glsl` parser, so errors inside function bodies
//! are caught as well as declaration errors. WGSL entry points and
//! `var<uniform>` bindings are scanned directly, then the whole module is
//! run through naga's front end and validator where `wgpu` is available.
//! Backends that have no driver-side reflection use it to resolve
//! locations.

use glsl::parser::Parse;
use glsl::syntax::{
    Declaration as GlslDeclaration, ExternalDeclaration, FullySpecifiedType, Identifier,
    InitDeclaratorList, StorageQualifier, TranslationUnit, TypeQualifierSpec, TypeSpecifier,
    TypeSpecifierNonArray,
};
use glsl::visitor::{Host, Visit, Visitor};

use crate::gpu::ShaderStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderLanguage {
    Glsl,
    Wgsl,
}

/// A named, typed declaration. `slot` is the explicit `@location` or
/// `@binding` index when the source gives one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub ty: String,
    pub slot: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInterface {
    pub stage: ShaderStage,
    pub language: ShaderLanguage,
    pub entry_point: String,
    pub attributes: Vec<Declaration>,
    pub uniforms: Vec<Declaration>,
}

/// Checks `source` and returns its interface, or a compile log.
pub fn inspect(stage: ShaderStage, source: &str) -> Result<ShaderInterface, String> {
    let code = strip_comments(source);
    check_delimiters(&code)?;
    if looks_like_wgsl(&code) {
        let interface = inspect_wgsl(stage, &code)?;
        #[cfg(not(target_arch = "wasm32"))]
        validate_wgsl(source)?;
        Ok(interface)
    } else {
        inspect_glsl(stage, &code)
    }
}

/// Full WGSL front end and validator, for the diagnostics it produces.
#[cfg(not(target_arch = "wasm32"))]
fn validate_wgsl(source: &str) -> Result<(), String> {
    use wgpu::naga;

    let module = naga::front::wgsl::parse_str(source).map_err(|err| err.emit_to_string(source))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map(|_| ())
    .map_err(|err| err.emit_to_string(source))
}

fn looks_like_wgsl(code: &str) -> bool {
    code.contains("@vertex") || code.contains("@fragment") || code.contains("var<")
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if ch == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut previous = '\0';
            for next in chars.by_ref() {
                if next == '\n' {
                    out.push('\n');
                }
                if previous == '*' && next == '/' {
                    break;
                }
                previous = next;
            }
            out.push(' ');
        } else {
            out.push(ch);
        }
    }
    out
}

fn check_delimiters(code: &str) -> Result<(), String> {
    let mut open: Vec<(char, usize)> = Vec::new();
    for (index, line) in code.lines().enumerate() {
        let line_no = index + 1;
        for ch in line.chars() {
            match ch {
                '(' | '{' | '[' => open.push((ch, line_no)),
                ')' | '}' | ']' => {
                    let expected = match ch {
                        ')' => '(',
                        '}' => '{',
                        _ => '[',
                    };
                    match open.pop() {
                        Some((found, _)) if found == expected => {}
                        Some((found, opened_at)) => {
                            return Err(format!(
                                "line {line_no}: `{ch}` does not match `{found}` opened on line {opened_at}"
                            ));
                        }
                        None => return Err(format!("line {line_no}: unexpected `{ch}`")),
                    }
                }
                _ => {}
            }
        }
    }
    match open.pop() {
        Some((found, opened_at)) => Err(format!("line {opened_at}: `{found}` is never closed")),
        None => Ok(()),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Interface checks a linker performs: stage order, one language, and
/// consistent uniform declarations across stages.
pub fn check_link(vertex: &ShaderInterface, fragment: &ShaderInterface) -> Result<(), String> {
    if vertex.stage != ShaderStage::Vertex {
        return Err("vertex slot holds a fragment shader".to_string());
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err("fragment slot holds a vertex shader".to_string());
    }
    if vertex.language != fragment.language {
        return Err("vertex and fragment shaders use different languages".to_string());
    }
    for uniform in &fragment.uniforms {
        if let Some(other) = vertex.uniforms.iter().find(|u| u.name == uniform.name) {
            if other.ty != uniform.ty {
                return Err(format!(
                    "uniform `{}` is declared as `{}` and `{}`",
                    uniform.name, other.ty, uniform.ty
                ));
            }
        }
    }
    if vertex.language == ShaderLanguage::Wgsl {
        for uniform in &fragment.uniforms {
            let clash = vertex
                .uniforms
                .iter()
                .find(|u| u.slot == uniform.slot && u.name != uniform.name);
            if let Some(other) = clash {
                return Err(format!(
                    "uniforms `{}` and `{}` share a binding",
                    other.name, uniform.name
                ));
            }
        }
    }
    Ok(())
}

/// Uniforms of a linked pair: the vertex stage's first, then any the
/// fragment stage adds.
pub fn merged_uniforms(vertex: &ShaderInterface, fragment: &ShaderInterface) -> Vec<Declaration> {
    let mut uniforms = vertex.uniforms.clone();
    for uniform in &fragment.uniforms {
        if !uniforms.iter().any(|u| u.name == uniform.name) {
            uniforms.push(uniform.clone());
        }
    }
    uniforms
}

// ---------------------------------------------------------------------------
// GLSL
// ---------------------------------------------------------------------------

const SHARED_BUILTINS: [&str; 10] = [
    "gl_DepthRange",
    "gl_DepthRangeParameters",
    "gl_MaxVertexAttribs",
    "gl_MaxVertexUniformVectors",
    "gl_MaxVaryingVectors",
    "gl_MaxVertexTextureImageUnits",
    "gl_MaxCombinedTextureImageUnits",
    "gl_MaxTextureImageUnits",
    "gl_MaxFragmentUniformVectors",
    "gl_MaxDrawBuffers",
];
const VERTEX_BUILTINS: [&str; 2] = ["gl_Position", "gl_PointSize"];
const FRAGMENT_BUILTINS: [&str; 5] = [
    "gl_FragCoord",
    "gl_FrontFacing",
    "gl_FragColor",
    "gl_FragData",
    "gl_PointCoord",
];

fn is_builtin(stage: ShaderStage, name: &str) -> bool {
    let stage_builtins: &[&str] = match stage {
        ShaderStage::Vertex => &VERTEX_BUILTINS,
        ShaderStage::Fragment => &FRAGMENT_BUILTINS,
    };
    SHARED_BUILTINS.contains(&name) || stage_builtins.contains(&name)
}

/// Flags the first `gl_` name that is not a builtin of the stage.
struct BuiltinCheck {
    stage: ShaderStage,
    unknown: Option<String>,
}

impl Visitor for BuiltinCheck {
    fn visit_identifier(&mut self, ident: &Identifier) -> Visit {
        let name = ident.0.as_str();
        if self.unknown.is_none() && name.starts_with("gl_") && !is_builtin(self.stage, name) {
            self.unknown = Some(name.to_string());
        }
        Visit::Children
    }
}

fn inspect_glsl(stage: ShaderStage, code: &str) -> Result<ShaderInterface, String> {
    // Directives are blanked so line numbers in parse errors still match.
    let code = code
        .lines()
        .map(|line| if line.trim_start().starts_with('#') { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n");
    let unit = TranslationUnit::parse(code.as_str())
        .map_err(|err| format!("syntax error: {}", err.info.trim()))?;

    let mut check = BuiltinCheck {
        stage,
        unknown: None,
    };
    unit.visit(&mut check);
    if let Some(name) = check.unknown {
        return Err(format!("undeclared identifier `{name}` in {stage} shader"));
    }

    let mut attributes = Vec::new();
    let mut uniforms = Vec::new();
    let mut has_main = false;

    for external in (unit.0).0.iter() {
        match external {
            ExternalDeclaration::Declaration(GlslDeclaration::InitDeclaratorList(list)) => {
                let declarations = declared_names(list);
                match storage_qualifier(&list.head.ty) {
                    Some(StorageQualifier::Uniform) => uniforms.extend(declarations),
                    Some(StorageQualifier::Attribute) if stage == ShaderStage::Fragment => {
                        let names: Vec<_> = declarations.iter().map(|d| d.name.as_str()).collect();
                        return Err(format!(
                            "attribute `{}`: attributes are only allowed in vertex shaders",
                            names.join(", ")
                        ));
                    }
                    Some(StorageQualifier::Attribute) | Some(StorageQualifier::In)
                        if stage == ShaderStage::Vertex =>
                    {
                        attributes.extend(declarations)
                    }
                    _ => {}
                }
            }
            ExternalDeclaration::FunctionDefinition(function)
                if function.prototype.name.0.as_str() == "main" =>
            {
                if function.prototype.ty.ty.ty != TypeSpecifierNonArray::Void {
                    return Err("`main` must return `void`".to_string());
                }
                if has_main {
                    return Err("`main` is defined more than once".to_string());
                }
                has_main = true;
            }
            _ => {}
        }
    }

    if !has_main {
        return Err("no `void main()` entry point".to_string());
    }

    Ok(ShaderInterface {
        stage,
        language: ShaderLanguage::Glsl,
        entry_point: "main".to_string(),
        attributes,
        uniforms,
    })
}

fn storage_qualifier(ty: &FullySpecifiedType) -> Option<&StorageQualifier> {
    ty.qualifier.as_ref()?.qualifiers.0.iter().find_map(|spec| match spec {
        TypeQualifierSpec::Storage(storage) => Some(storage),
        _ => None,
    })
}

/// Every name in `uniform vec3 a, b;` with the shared type.
fn declared_names(list: &InitDeclaratorList) -> Vec<Declaration> {
    let ty = glsl_type_name(&list.head.ty.ty);
    list.head
        .name
        .iter()
        .chain(list.tail.iter().map(|rest| &rest.ident.ident))
        .map(|name| Declaration {
            name: name.0.to_string(),
            ty: ty.clone(),
            slot: None,
        })
        .collect()
}

fn glsl_type_name(ty: &TypeSpecifier) -> String {
    use TypeSpecifierNonArray as T;

    let name = match &ty.ty {
        T::Void => "void",
        T::Bool => "bool",
        T::Int => "int",
        T::Float => "float",
        T::Vec2 => "vec2",
        T::Vec3 => "vec3",
        T::Vec4 => "vec4",
        T::IVec2 => "ivec2",
        T::IVec3 => "ivec3",
        T::IVec4 => "ivec4",
        T::BVec2 => "bvec2",
        T::BVec3 => "bvec3",
        T::BVec4 => "bvec4",
        T::Mat2 => "mat2",
        T::Mat3 => "mat3",
        T::Mat4 => "mat4",
        T::Sampler2D => "sampler2D",
        T::SamplerCube => "samplerCube",
        T::TypeName(name) => return name.0.to_string(),
        other => return format!("{other:?}").to_lowercase(),
    };
    name.to_string()
}

// ---------------------------------------------------------------------------
// WGSL
// ---------------------------------------------------------------------------

fn inspect_wgsl(stage: ShaderStage, code: &str) -> Result<ShaderInterface, String> {
    let marker = match stage {
        ShaderStage::Vertex => "@vertex",
        ShaderStage::Fragment => "@fragment",
    };
    let (entry_point, params) =
        wgsl_entry_point(code, marker).ok_or_else(|| format!("no `{marker}` entry point"))?;

    let mut uniforms = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = code[search_from..].find("var<uniform>") {
        let start = search_from + offset;
        let end = start + "var<uniform>".len();
        uniforms.push(wgsl_uniform(code, start, end)?);
        search_from = end;
    }

    let attributes = if stage == ShaderStage::Vertex {
        split_top_level(&params, ',')
            .into_iter()
            .filter(|param| param.contains("@location"))
            .map(|param| wgsl_attribute(&param))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    Ok(ShaderInterface {
        stage,
        language: ShaderLanguage::Wgsl,
        entry_point,
        attributes,
        uniforms,
    })
}

/// Finds `<marker> fn name(params)` and returns the name and the raw
/// parameter list.
fn wgsl_entry_point(code: &str, marker: &str) -> Option<(String, String)> {
    let start = code.find(marker)? + marker.len();
    let after = code[start..].trim_start().strip_prefix("fn")?;
    let name_end = after.find('(')?;
    let name = after[..name_end].trim();
    if !is_identifier(name) {
        return None;
    }

    let mut depth = 0usize;
    let mut params = String::new();
    for ch in after[name_end..].chars() {
        match ch {
            '(' => {
                depth += 1;
                if depth == 1 {
                    continue;
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((name.to_string(), params));
                }
            }
            _ => {}
        }
        params.push(ch);
    }
    None
}

fn wgsl_uniform(code: &str, start: usize, end: usize) -> Result<Declaration, String> {
    let prefix_start = code[..start]
        .rfind(|ch| ch == ';' || ch == '}')
        .map_or(0, |index| index + 1);
    let prefix = &code[prefix_start..start];

    let declaration_end = code[end..]
        .find(';')
        .map(|index| end + index)
        .ok_or_else(|| "uniform declaration is missing `;`".to_string())?;
    let declaration = code[end..declaration_end].trim();
    let (name, ty) = declaration
        .split_once(':')
        .map(|(name, ty)| (name.trim(), ty.trim()))
        .ok_or_else(|| format!("malformed uniform declaration `{declaration}`"))?;
    if !is_identifier(name) || ty.is_empty() {
        return Err(format!("malformed uniform declaration `{declaration}`"));
    }

    let group = attribute_value(prefix, "@group")?.unwrap_or(0);
    if group != 0 {
        return Err(format!(
            "uniform `{name}` uses @group({group}); only @group(0) is supported"
        ));
    }
    let binding = attribute_value(prefix, "@binding")?
        .ok_or_else(|| format!("uniform `{name}` has no @binding"))?;

    Ok(Declaration {
        name: name.to_string(),
        ty: ty.to_string(),
        slot: Some(binding),
    })
}

fn wgsl_attribute(param: &str) -> Result<Declaration, String> {
    let slot = attribute_value(param, "@location")?;
    let mut rest = param.trim_start();
    while let Some(after_at) = rest.strip_prefix('@') {
        let name_len = after_at
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .unwrap_or(after_at.len());
        rest = after_at[name_len..].trim_start();
        if rest.starts_with('(') {
            let close = rest
                .find(')')
                .ok_or_else(|| format!("malformed attribute in `{}`", param.trim()))?;
            rest = rest[close + 1..].trim_start();
        }
    }

    let (name, ty) = rest
        .split_once(':')
        .map(|(name, ty)| (name.trim(), ty.trim()))
        .ok_or_else(|| format!("malformed parameter `{}`", param.trim()))?;
    if !is_identifier(name) {
        return Err(format!("malformed parameter `{}`", param.trim()));
    }

    Ok(Declaration {
        name: name.to_string(),
        ty: ty.to_string(),
        slot,
    })
}

/// Reads the integer argument of an `@name(N)` attribute, if present.
fn attribute_value(text: &str, attribute: &str) -> Result<Option<u32>, String> {
    let Some(index) = text.find(attribute) else {
        return Ok(None);
    };
    let rest = text[index + attribute.len()..].trim_start();
    let inner = rest
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(inner, _)| inner.trim())
        .ok_or_else(|| format!("malformed `{attribute}` attribute"))?;
    inner
        .parse::<u32>()
        .map(Some)
        .map_err(|_| format!("`{attribute}({inner})` is not a valid index"))
}

fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for ch in text.chars() {
        match ch {
            '(' | '<' | '[' => depth += 1,
            ')' | '>' | ']' => depth -= 1,
            _ => {}
        }
        if ch == separator && depth == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
