use std::collections::{BTreeMap, BTreeSet};

use pyx_pep440::Version;

use crate::requirement::{MarkerEnvironment, PackageName, ParseError, Requirement};

/// A version recorded by a previous lock, preferred but not required
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub version: Version,
    /// Source the pinned version came from, if known
    pub source: Option<String>,
}

impl Pin {
    pub fn new(version: Version) -> Self {
        Self { version, source: None }
    }

    pub fn from_source(version: Version, source: impl Into<String>) -> Self {
        Self {
            version,
            source: Some(source.into()),
        }
    }
}

/// Which packages may move away from their pinned versions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Upgrade {
    /// Keep every pin that still satisfies the constraints
    #[default]
    None,
    /// Ignore all pins and prefer the newest versions
    All,
    /// Ignore the pins of the named packages only
    Packages(BTreeSet<PackageName>),
}

impl Upgrade {
    /// Whether `name` should ignore its pin
    pub fn includes(&self, name: &PackageName) -> bool {
        match self {
            Upgrade::None => false,
            Upgrade::All => true,
            Upgrade::Packages(names) => names.contains(name),
        }
    }
}

/// What to resolve: root requirements in declaration order, the target
/// environment, pins from an existing lock and the upgrade strategy.
#[derive(Debug, Clone)]
pub struct Request {
    requirements: Vec<Requirement>,
    environment: MarkerEnvironment,
    pins: BTreeMap<PackageName, Pin>,
    upgrade: Upgrade,
}

impl Request {
    /// Create an empty request for an environment
    pub fn new(environment: MarkerEnvironment) -> Self {
        Self {
            requirements: Vec::new(),
            environment,
            pins: BTreeMap::new(),
            upgrade: Upgrade::None,
        }
    }

    /// Parse requirement strings into a request
    pub fn parse(requirements: &[&str], environment: MarkerEnvironment) -> Result<Self, ParseError> {
        let mut request = Self::new(environment);
        for requirement in requirements {
            request.requirements.push(Requirement::parse(requirement)?);
        }
        Ok(request)
    }

    /// Add a root requirement
    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Prefer `pin` for `name`
    pub fn pin(mut self, name: PackageName, pin: Pin) -> Self {
        self.pins.insert(name, pin);
        self
    }

    /// Replace all pins
    pub fn with_pins(mut self, pins: BTreeMap<PackageName, Pin>) -> Self {
        self.pins = pins;
        self
    }

    pub fn upgrade(mut self, upgrade: Upgrade) -> Self {
        self.upgrade = upgrade;
        self
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn environment(&self) -> &MarkerEnvironment {
        &self.environment
    }

    pub fn pins(&self) -> &BTreeMap<PackageName, Pin> {
        &self.pins
    }

    pub fn upgrade_strategy(&self) -> &Upgrade {
        &self.upgrade
    }
}
