//! Library dependency declarations
//!
//! A library entry is flat on the wire: the `type` discriminator selects which
//! of the other fields are meaningful. Fields missing from the manifest
//! deserialize as empty and are dropped from the submission payload rather
//! than defaulted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of library dependency
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    /// JVM jar, uses `path`
    Jar,
    /// Python egg, uses `path`
    Egg,
    /// Python wheel, uses `path`
    Whl,
    /// PyPI package, uses `package` and `repo`
    Pypi,
    /// Maven artifact, uses `coordinates`, `repo` and `exclusions`
    Maven,
    /// CRAN package, uses `package` and `repo`
    Cran,
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jar => write!(f, "jar"),
            Self::Egg => write!(f, "egg"),
            Self::Whl => write!(f, "whl"),
            Self::Pypi => write!(f, "pypi"),
            Self::Maven => write!(f, "maven"),
            Self::Cran => write!(f, "cran"),
        }
    }
}

/// A library installed on the run's cluster before the task starts
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySpec {
    /// Library kind
    #[serde(rename = "type")]
    pub kind: LibraryKind,

    /// Storage URI of a jar, egg or wheel (e.g. `dbfs:/libs/etl.jar`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// PyPI requirement string or CRAN package name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,

    /// Maven coordinates, e.g. `org.jsoup:jsoup:1.7.2`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub coordinates: String,

    /// Package index, Maven repository or CRAN mirror (platform default when empty)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,

    /// Maven dependencies to exclude, as `groupId:artifactId`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
}

impl LibrarySpec {
    /// A library entry of the given kind with every field empty
    pub fn new(kind: LibraryKind) -> Self {
        Self {
            kind,
            path: String::new(),
            package: String::new(),
            coordinates: String::new(),
            repo: String::new(),
            exclusions: Vec::new(),
        }
    }

    /// Set the path (jar, egg, whl)
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the package (pypi, cran)
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Set the coordinates (maven)
    pub fn with_coordinates(mut self, coordinates: impl Into<String>) -> Self {
        self.coordinates = coordinates.into();
        self
    }

    /// Set the repository (pypi, maven, cran)
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    /// Name of the field identifying the artifact for this kind
    pub fn required_field(&self) -> &'static str {
        match self.kind {
            LibraryKind::Jar | LibraryKind::Egg | LibraryKind::Whl => "path",
            LibraryKind::Pypi | LibraryKind::Cran => "package",
            LibraryKind::Maven => "coordinates",
        }
    }

    /// Value of the field identifying the artifact for this kind
    pub fn artifact(&self) -> &str {
        match self.kind {
            LibraryKind::Jar | LibraryKind::Egg | LibraryKind::Whl => &self.path,
            LibraryKind::Pypi | LibraryKind::Cran => &self.package,
            LibraryKind::Maven => &self.coordinates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_kind() {
        let yaml = r#"
- type: jar
  path: dbfs:/libs/a.jar
- type: egg
  path: dbfs:/libs/b.egg
- type: whl
  path: dbfs:/libs/c.whl
- type: pypi
  package: simplejson==3.8.0
- type: maven
  coordinates: org.jsoup:jsoup:1.7.2
  exclusions: ["slf4j:slf4j"]
- type: cran
  package: ada
  repo: https://cran.example.com
"#;
        let libs: Vec<LibrarySpec> = serde_yaml::from_str(yaml).unwrap();
        let kinds: Vec<String> = libs.iter().map(|l| l.kind.to_string()).collect();
        assert_eq!(kinds, ["jar", "egg", "whl", "pypi", "maven", "cran"]);
        assert_eq!(
            libs[3],
            LibrarySpec::new(LibraryKind::Pypi).with_package("simplejson==3.8.0")
        );
        assert_eq!(libs[4].exclusions, vec!["slf4j:slf4j".to_string()]);
    }

    #[test]
    fn missing_fields_deserialize_empty() {
        let lib: LibrarySpec = serde_yaml::from_str("type: maven").unwrap();
        assert_eq!(lib, LibrarySpec::new(LibraryKind::Maven));
        assert_eq!(lib.required_field(), "coordinates");
        assert!(lib.artifact().is_empty());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result: Result<LibrarySpec, _> = serde_yaml::from_str("type: npm\npath: x");
        assert!(result.is_err());
    }

    #[test]
    fn artifact_follows_kind() {
        let whl = LibrarySpec::new(LibraryKind::Whl).with_path("dbfs:/w.whl");
        assert_eq!(whl.artifact(), "dbfs:/w.whl");
        let cran = LibrarySpec::new(LibraryKind::Cran).with_package("ada");
        assert_eq!(cran.artifact(), "ada");
    }
}
