//! Heuristic source scanner.
//!
//! [`Scanner::scan`] turns one unit of C++/C# source text into a
//! [`FileFacts`] record. It never touches the filesystem and is fully
//! deterministic: identical `(text, path)` input always yields an identical
//! result.
//!
//! Extraction is a set of independent rules rather than a grammar. Each rule
//! below produces its own partial result and none depends on another
//! succeeding:
//!
//! | Rule | Output |
//! |------|--------|
//! | [`extract_classes`] | class/struct declarations, single parent, annotation merge |
//! | [`extract_functions`] | `ret name(params) {` / `;` shapes, capped |
//! | [`extract_includes`] | `#include` targets in appearance order |
//! | [`extract_dependencies`] | project includes + forward declarations, capped |
//! | [`detect_framework_features`] | reflection macros, Blueprint exposure, components |
//! | [`naming_patterns`] | filename convention tags |
//! | [`purpose_for`] | filename → description lookup |
//! | [`key_features`] | coarse feature tags from identifiers in the text |

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::config::ScannerConfig;
use crate::models::{Complexity, FileType, FrameworkFeatures};

static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:class|struct)\s+(?:[A-Z0-9_]+_API\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*(?:final\s*)?(?::\s*(?:public|protected|private)\s+([A-Za-z_][A-Za-z0-9_:]*))?\s*\{",
    )
    .expect("class declaration regex")
});
static ANNOTATED_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:UCLASS|USTRUCT)\s*\([^)]*\)\s*(?:class|struct)\s+(?:[A-Z0-9_]+_API\s+)?(\w+)")
        .expect("annotated class regex")
});
static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:virtual\s+)?(?:static\s+)?(\w+)\s+(~?\w+(?:::~?\w+)*)\s*\([^)]*\)\s*(?:const\s*)?(?:override\s*)?[{;]",
    )
    .expect("function regex")
});
static INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"#include\s+["<]([^">]+)[">]"#).expect("include regex"));
static FORWARD_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+(\w+)\s*;").expect("forward declaration regex"));
static FRAMEWORK_BASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*public\s+[AUF]").expect("framework base regex"));
static COMPONENT_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"UPROPERTY\s*\([^)]*\)\s*(?:class\s+)?(?:\w+\s*\*|TObjectPtr<\s*\w+\s*>)\s*(\w*Component)\b",
    )
    .expect("component property regex")
});

/// Identifiers that look like a return type or name but are control flow.
const FUNCTION_STOPLIST: &[&str] = &[
    "if", "for", "while", "switch", "class", "struct", "return", "else", "new", "delete",
    "sizeof",
];

/// Single-letter class prefixes of the engine naming convention.
const FRAMEWORK_PREFIXES: &[char] = &['A', 'U', 'F'];

/// Reflection macros reported in [`FrameworkFeatures::macros`], in this order.
const FRAMEWORK_MACROS: &[&str] = &[
    "UCLASS",
    "USTRUCT",
    "UFUNCTION",
    "UPROPERTY",
    "UENUM",
    "GENERATED_BODY",
];

const BLUEPRINT_MARKERS: &[&str] = &["BlueprintCallable", "BlueprintImplementableEvent"];

/// Include prefixes/fragments that point at the engine or the standard library.
const EXTERNAL_INCLUDE_PREFIXES: &[&str] = &["Engine/", "CoreMinimal"];
const EXTERNAL_INCLUDE_FRAGMENTS: &[&str] = &["std", "Windows.h"];

/// A filename convention rule. `needles` match as substrings, or as a
/// prefix when `prefix` is set.
pub struct NamingRule {
    pub name: &'static str,
    pub description: &'static str,
    needles: &'static [&'static str],
    prefix: bool,
}

impl NamingRule {
    fn matches(&self, file_name: &str) -> bool {
        if self.prefix {
            self.needles.iter().any(|n| file_name.starts_with(n))
        } else {
            self.needles.iter().any(|n| file_name.contains(n))
        }
    }
}

pub const NAMING_RULES: &[NamingRule] = &[
    NamingRule {
        name: "UE_Widget_Pattern",
        description: "UMG widget blueprint naming (WBP_ prefix)",
        needles: &["WBP_"],
        prefix: true,
    },
    NamingRule {
        name: "Character_Class_Pattern",
        description: "Character class hierarchy",
        needles: &["Character"],
        prefix: false,
    },
    NamingRule {
        name: "Component_Pattern",
        description: "Actor component composition",
        needles: &["Component"],
        prefix: false,
    },
    NamingRule {
        name: "AI_Behavior_Pattern",
        description: "AI controllers and behavior tree nodes",
        needles: &["BT", "AI"],
        prefix: false,
    },
    NamingRule {
        name: "Damage_System_Pattern",
        description: "Damage calculation and feedback",
        needles: &["Damage"],
        prefix: false,
    },
    NamingRule {
        name: "Store_System_Pattern",
        description: "Store and shop commerce flow",
        needles: &["Store", "Shop"],
        prefix: false,
    },
    NamingRule {
        name: "Inventory_System_Pattern",
        description: "Inventory storage and item handling",
        needles: &["Inventory"],
        prefix: false,
    },
];

const DEFAULT_PURPOSE: &str = "General implementation file";

const PURPOSE_RULES: &[(&[&str], &str)] = &[
    (&["WBP_"], "UI Widget implementation"),
    (&["Character"], "Character class definition and behavior"),
    (&["Component"], "Component system functionality"),
    (&["GameMode"], "Game mode and rules implementation"),
    (&["HUD"], "HUD and user interface management"),
    (&["AI", "BT"], "AI behavior and decision making"),
    (&["Damage"], "Damage calculation and display system"),
    (&["Store", "Shop"], "Store and commerce system"),
    (&["Inventory"], "Inventory management system"),
    (&["Item"], "Item system and data structures"),
    (&[".Build.cs"], "Build configuration and dependencies"),
    (&[".Target.cs"], "Build target configuration"),
];

const FEATURE_RULES: &[(&[&str], &str)] = &[
    (&["TArray"], "Dynamic Arrays"),
    (&["FVector", "FTransform"], "3D Mathematics"),
    (&["UWidget", "UserWidget"], "UI System"),
    (&["Multicast", "Server", "Client"], "Networking"),
    (&["Timer", "Delay"], "Timing System"),
    (&["Animation", "Montage"], "Animation System"),
];

/// Output caps applied during extraction.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    pub max_functions: usize,
    pub max_dependencies: usize,
    pub annotation_lookback: usize,
}

impl From<&ScannerConfig> for ScanLimits {
    fn from(cfg: &ScannerConfig) -> Self {
        Self {
            max_functions: cfg.max_functions,
            max_dependencies: cfg.max_dependencies,
            annotation_lookback: cfg.annotation_lookback,
        }
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassFact {
    pub name: String,
    pub parent: Option<String>,
    pub is_framework_class: bool,
    pub has_class_annotation: bool,
    /// 1-based line of the declaration (0 when only the annotation matched).
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionFact {
    pub name: String,
    /// Qualifying class for out-of-line definitions (`AFoo::Tick`).
    pub owner: Option<String>,
    pub return_type: String,
    pub framework_exposed: bool,
    pub line: usize,
}

/// Structural facts about one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacts {
    pub file_name: String,
    pub file_type: FileType,
    pub line_count: usize,
    pub classes: Vec<ClassFact>,
    pub functions: Vec<FunctionFact>,
    pub includes: Vec<String>,
    pub forward_declarations: Vec<String>,
    pub dependencies: Vec<String>,
    pub framework: FrameworkFeatures,
    pub patterns: Vec<String>,
    pub complexity: Complexity,
    pub purpose: String,
    pub key_features: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Scanner {
    limits: ScanLimits,
}

impl Scanner {
    pub fn new(limits: ScanLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ScanLimits {
        self.limits
    }

    /// Extract every fact kind from `text`. `path` is only used for its
    /// file name and extension.
    pub fn scan(&self, text: &str, path: &str) -> FileFacts {
        let file_name = file_name_of(path).to_string();
        let includes = extract_includes(text);
        let forward_declarations = extract_forward_declarations(text);
        let framework = detect_framework_features(text);
        let line_count = text.lines().count();

        FileFacts {
            file_type: classify_file(path, text),
            line_count,
            classes: extract_classes(text),
            functions: extract_functions(text, &self.limits),
            dependencies: extract_dependencies(
                &includes,
                &forward_declarations,
                self.limits.max_dependencies,
            ),
            key_features: key_features(text, &framework),
            patterns: naming_patterns(&file_name),
            complexity: Complexity::from_line_count(line_count),
            purpose: purpose_for(&file_name).to_string(),
            includes,
            forward_declarations,
            framework,
            file_name,
        }
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Classify by extension, refined by framework markers in the text.
pub fn classify_file(path: &str, text: &str) -> FileType {
    let name = file_name_of(path);
    if name.ends_with(".h") {
        if text.contains("UCLASS") || text.contains("USTRUCT") {
            FileType::FrameworkHeader
        } else {
            FileType::Header
        }
    } else if name.ends_with(".cpp") {
        if text.contains("#include") && text.contains("IMPLEMENT_") {
            FileType::FrameworkImplementation
        } else {
            FileType::Implementation
        }
    } else if name.ends_with(".cs") {
        FileType::BuildScript
    } else {
        FileType::Unknown
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}

fn is_framework_name(name: &str) -> bool {
    name.starts_with(FRAMEWORK_PREFIXES)
}

/// Class and struct declarations. An annotated declaration (`UCLASS(...)
/// class X`) is merged into the plain match for `X` instead of duplicating it.
pub fn extract_classes(text: &str) -> Vec<ClassFact> {
    let mut classes: Vec<ClassFact> = Vec::new();

    for caps in CLASS_DECL.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().to_string();
        if classes.iter().any(|c| c.name == name) {
            continue;
        }
        classes.push(ClassFact {
            is_framework_class: is_framework_name(&name),
            parent: caps.get(2).map(|p| p.as_str().to_string()),
            has_class_annotation: false,
            line: line_of(text, whole.start()),
            name,
        });
    }

    for caps in ANNOTATED_CLASS.captures_iter(text) {
        let Some(name) = caps.get(1) else { continue };
        let name = name.as_str();
        match classes.iter_mut().find(|c| c.name == name) {
            Some(existing) => {
                existing.has_class_annotation = true;
                existing.is_framework_class = true;
            }
            None => classes.push(ClassFact {
                name: name.to_string(),
                parent: None,
                is_framework_class: true,
                has_class_annotation: true,
                line: 0,
            }),
        }
    }

    classes
}

/// Function declarations and definitions, first `limits.max_functions` only.
/// Destructors and control-flow keywords are skipped.
pub fn extract_functions(text: &str, limits: &ScanLimits) -> Vec<FunctionFact> {
    let mut functions = Vec::new();

    for caps in FUNCTION.captures_iter(text) {
        if functions.len() == limits.max_functions {
            break;
        }
        let (Some(whole), Some(ret), Some(qualified)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let qualified = qualified.as_str();
        if qualified.contains('~') {
            continue;
        }
        let (owner, name) = match qualified.rsplit_once("::") {
            Some((owner, name)) => (Some(owner.to_string()), name),
            None => (None, qualified),
        };
        if FUNCTION_STOPLIST.contains(&name) || FUNCTION_STOPLIST.contains(&ret.as_str()) {
            continue;
        }
        functions.push(FunctionFact {
            name: name.to_string(),
            owner,
            return_type: ret.as_str().to_string(),
            framework_exposed: annotated_within(
                text,
                whole.start(),
                limits.annotation_lookback,
                "UFUNCTION",
            ),
            line: line_of(text, whole.start()),
        });
    }

    functions
}

/// Whether `marker` occurs in the `lookback` bytes before `start`, within the
/// same declaration (the window is cut at the last `;`, `{` or `}`).
fn annotated_within(text: &str, start: usize, lookback: usize, marker: &str) -> bool {
    let mut lo = start.saturating_sub(lookback);
    while !text.is_char_boundary(lo) {
        lo += 1;
    }
    let window = &text[lo..start];
    let window = match window.rfind([';', '{', '}']) {
        Some(cut) => &window[cut + 1..],
        None => window,
    };
    window.contains(marker)
}

pub fn extract_includes(text: &str) -> Vec<String> {
    INCLUDE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

pub fn extract_forward_declarations(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in FORWARD_DECL.captures_iter(text) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Project-local includes (reduced to their stem) followed by forward
/// declarations, de-duplicated and capped at `max`.
pub fn extract_dependencies(
    includes: &[String],
    forward_declarations: &[String],
    max: usize,
) -> Vec<String> {
    let local = includes
        .iter()
        .filter(|inc| {
            !EXTERNAL_INCLUDE_PREFIXES.iter().any(|p| inc.starts_with(p))
                && !EXTERNAL_INCLUDE_FRAGMENTS.iter().any(|f| inc.contains(f))
                && !inc.ends_with(".generated.h")
        })
        .map(|inc| {
            let base = inc.rsplit('/').next().unwrap_or(inc);
            base.strip_suffix(".h").unwrap_or(base).to_string()
        });

    let mut deps: Vec<String> = Vec::new();
    for dep in local.chain(forward_declarations.iter().cloned()) {
        if deps.len() == max {
            break;
        }
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }
    deps
}

pub fn detect_framework_features(text: &str) -> FrameworkFeatures {
    let mut components: Vec<String> = Vec::new();
    for caps in COMPONENT_PROPERTY.captures_iter(text) {
        if let Some(name) = caps.get(1) {
            if !name.as_str().is_empty() && !components.iter().any(|c| c == name.as_str()) {
                components.push(name.as_str().to_string());
            }
        }
    }

    FrameworkFeatures {
        is_framework_class: FRAMEWORK_BASE.is_match(text),
        macros: FRAMEWORK_MACROS
            .iter()
            .filter(|m| text.contains(*m))
            .map(|m| m.to_string())
            .collect(),
        blueprint_exposed: BLUEPRINT_MARKERS.iter().any(|m| text.contains(m)),
        components,
    }
}

/// Every naming rule that matches `file_name`.
pub fn naming_patterns(file_name: &str) -> Vec<String> {
    NAMING_RULES
        .iter()
        .filter(|rule| rule.matches(file_name))
        .map(|rule| rule.name.to_string())
        .collect()
}

/// Description of a naming pattern produced by [`naming_patterns`].
pub fn naming_rule_description(name: &str) -> Option<&'static str> {
    NAMING_RULES
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.description)
}

/// First matching purpose description, or the generic fallback.
pub fn purpose_for(file_name: &str) -> &'static str {
    PURPOSE_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| file_name.contains(n)))
        .map(|(_, purpose)| *purpose)
        .unwrap_or(DEFAULT_PURPOSE)
}

pub fn key_features(text: &str, framework: &FrameworkFeatures) -> Vec<String> {
    let mut features = Vec::new();
    if framework.blueprint_exposed {
        features.push("Blueprint Integration".to_string());
    }
    if !framework.components.is_empty() {
        features.push("Component Architecture".to_string());
    }
    for (needles, feature) in FEATURE_RULES {
        if needles.iter().any(|n| text.contains(n)) {
            features.push(feature.to_string());
        }
    }
    features
}

/// Byte offset of the `}` closing the `{` at `open`, if balanced.
pub(crate) fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A class declaration cut out of its file for on-demand analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassBlock {
    pub name: String,
    pub line: usize,
    pub parent: Option<String>,
    /// Names declared after a `UFUNCTION(...)` annotation.
    pub annotated_methods: Vec<String>,
    /// Names declared after a `UPROPERTY(...)` annotation.
    pub annotated_properties: Vec<String>,
    pub body: String,
}

static ANNOTATED_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UFUNCTION\s*\([^)]*\)\s*(?:virtual\s+)?(?:static\s+)?[\w:<>\*&\s]+?\b(\w+)\s*\(")
        .expect("annotated method regex")
});
static ANNOTATED_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UPROPERTY\s*\([^)]*\)\s*[\w:<>\*&,\s]+?\b(\w+)\s*(?:=[^;]*)?;")
        .expect("annotated property regex")
});

/// Locate the declaration of `class_name` and return its brace-balanced body.
pub fn extract_class_block(text: &str, class_name: &str) -> Option<ClassBlock> {
    for caps in CLASS_DECL.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if name.as_str() != class_name {
            continue;
        }
        let open = whole.end() - 1;
        let close = matching_brace(text, open)?;
        let body = &text[whole.start()..=close];
        return Some(ClassBlock {
            name: class_name.to_string(),
            line: line_of(text, whole.start()),
            parent: caps.get(2).map(|p| p.as_str().to_string()),
            annotated_methods: ANNOTATED_METHOD
                .captures_iter(body)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect(),
            annotated_properties: ANNOTATED_PROPERTY
                .captures_iter(body)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect(),
            body: body.to_string(),
        });
    }
    None
}
