//! Model groups and particles
//!
//! A compiled content model is a closed tree of [`Particle`] values:
//! element particles, wildcards, and `xs:sequence` / `xs:choice` /
//! `xs:all` groups nesting further particles. Trees are immutable once
//! the type system is resolved and are matched by
//! [`ContentAutomaton`](super::models::ContentAutomaton).

use crate::namespaces::QName;

use super::elements::ElementKey;
use super::particles::{Occurs, OccursCalculator};
use super::wildcards::Wildcard;

/// Model group compositor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelType {
    /// Ordered sequence of particles
    #[default]
    Sequence,
    /// One of multiple alternatives
    Choice,
    /// Unordered set of particles
    All,
}

impl ModelType {
    /// Parse from a schema element local name
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sequence" => Some(Self::Sequence),
            "choice" => Some(Self::Choice),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A node of a compiled content model
#[derive(Debug, Clone, PartialEq)]
pub enum Particle {
    /// Element declaration reference
    Element(ElementParticle),
    /// Wildcard (xs:any)
    Wildcard(WildcardParticle),
    /// Nested model group
    Group(ModelGroup),
}

impl Particle {
    /// Get the occurrence constraints
    pub fn occurs(&self) -> Occurs {
        match self {
            Self::Element(e) => e.occurs,
            Self::Wildcard(w) => w.occurs,
            Self::Group(g) => g.occurs,
        }
    }

    /// Whether the particle can match an empty sequence of children
    pub fn is_emptiable(&self) -> bool {
        match self {
            Self::Element(e) => e.occurs.is_emptiable(),
            Self::Wildcard(w) => w.occurs.is_emptiable(),
            Self::Group(g) => g.is_emptiable(),
        }
    }

    /// Whether one occurrence of the particle can be empty
    pub fn is_empty_term(&self) -> bool {
        match self {
            Self::Group(g) => g.is_content_emptiable(),
            _ => false,
        }
    }

    /// Total number of elements the particle can match
    pub fn effective_occurs(&self) -> Occurs {
        match self {
            Self::Group(g) => g.effective_occurs(),
            other => other.occurs(),
        }
    }

    /// Wrap the particle in a single-occurrence group of the given kind
    pub fn into_group(self, model: ModelType) -> ModelGroup {
        match self {
            Self::Group(g) if g.model == model && g.occurs == Occurs::once() => g,
            other => ModelGroup::new(model, vec![other]),
        }
    }
}

/// Element particle in a model group
#[derive(Debug, Clone, PartialEq)]
pub struct ElementParticle {
    /// Element name, copied from its declaration
    pub name: QName,
    /// Declaration the particle stands for
    pub element: ElementKey,
    /// Occurrence constraints
    pub occurs: Occurs,
}

impl ElementParticle {
    /// Create a new element particle
    pub fn new(name: QName, element: ElementKey, occurs: Occurs) -> Self {
        Self {
            name,
            element,
            occurs,
        }
    }
}

/// Wildcard particle (xs:any)
#[derive(Debug, Clone, PartialEq)]
pub struct WildcardParticle {
    /// Namespace constraint and process contents
    pub wildcard: Wildcard,
    /// Occurrence constraints
    pub occurs: Occurs,
}

impl WildcardParticle {
    /// Create a new wildcard particle
    pub fn new(wildcard: Wildcard, occurs: Occurs) -> Self {
        Self { wildcard, occurs }
    }
}

/// Model group (sequence, choice or all)
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGroup {
    /// Compositor
    pub model: ModelType,
    /// Member particles in declaration order
    pub particles: Vec<Particle>,
    /// Occurrence constraints of the group itself
    pub occurs: Occurs,
}

impl ModelGroup {
    /// Create a group occurring exactly once
    pub fn new(model: ModelType, particles: Vec<Particle>) -> Self {
        Self {
            model,
            particles,
            occurs: Occurs::once(),
        }
    }

    /// Set occurrence constraints
    pub fn with_occurs(mut self, occurs: Occurs) -> Self {
        self.occurs = occurs;
        self
    }

    /// Whether the group has no members
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Whether the group, with its own bounds, can match nothing
    pub fn is_emptiable(&self) -> bool {
        self.occurs.is_emptiable() || self.is_content_emptiable()
    }

    /// Whether a single occurrence of the group can match nothing
    pub fn is_content_emptiable(&self) -> bool {
        match self.model {
            ModelType::Sequence | ModelType::All => {
                self.particles.iter().all(Particle::is_emptiable)
            }
            ModelType::Choice => {
                self.particles.is_empty() || self.particles.iter().any(Particle::is_emptiable)
            }
        }
    }

    /// Total number of elements the group can match
    pub fn effective_occurs(&self) -> Occurs {
        let mut calc = OccursCalculator::new();
        for (i, particle) in self.particles.iter().enumerate() {
            match self.model {
                ModelType::Sequence | ModelType::All => calc.add(particle.effective_occurs()),
                ModelType::Choice => calc.alternative(particle.effective_occurs(), i == 0),
            }
        }
        calc.multiply(self.occurs);
        calc.occurs()
    }

    /// Element particles reachable anywhere in the group
    pub fn iter_elements(&self) -> Vec<&ElementParticle> {
        let mut found = Vec::new();
        let mut stack: Vec<&Particle> = self.particles.iter().rev().collect();
        while let Some(particle) = stack.pop() {
            match particle {
                Particle::Element(e) => found.push(e),
                Particle::Wildcard(_) => {}
                Particle::Group(g) => stack.extend(g.particles.iter().rev()),
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str, key: u32, occurs: Occurs) -> Particle {
        Particle::Element(ElementParticle::new(QName::local(name), ElementKey(key), occurs))
    }

    #[test]
    fn test_model_type() {
        assert_eq!(ModelType::from_tag("choice"), Some(ModelType::Choice));
        assert_eq!(ModelType::from_tag("group"), None);
        assert_eq!(ModelType::All.to_string(), "all");
    }

    #[test]
    fn test_emptiable() {
        let seq = ModelGroup::new(
            ModelType::Sequence,
            vec![element("a", 0, Occurs::optional()), element("b", 1, Occurs::once())],
        );
        assert!(!seq.is_emptiable());

        let choice = ModelGroup::new(
            ModelType::Choice,
            vec![element("a", 0, Occurs::optional()), element("b", 1, Occurs::once())],
        );
        assert!(choice.is_emptiable());
        assert!(ModelGroup::new(ModelType::Sequence, vec![]).is_content_emptiable());
        assert!(seq.clone().with_occurs(Occurs::optional()).is_emptiable());
    }

    #[test]
    fn test_effective_occurs() {
        let seq = ModelGroup::new(
            ModelType::Sequence,
            vec![element("a", 0, Occurs::once()), element("b", 1, Occurs::optional())],
        )
        .with_occurs(Occurs::new(1, Some(2)));
        assert_eq!(seq.effective_occurs(), Occurs::new(1, Some(4)));

        let choice = ModelGroup::new(
            ModelType::Choice,
            vec![element("a", 0, Occurs::once()), element("b", 1, Occurs::zero_or_more())],
        );
        assert_eq!(choice.effective_occurs(), Occurs::new(0, None));
    }

    #[test]
    fn test_iter_elements() {
        let inner = ModelGroup::new(ModelType::Choice, vec![element("b", 1, Occurs::once())]);
        let seq = ModelGroup::new(
            ModelType::Sequence,
            vec![
                element("a", 0, Occurs::once()),
                Particle::Group(inner),
                element("c", 2, Occurs::once()),
            ],
        );
        let names: Vec<String> = seq.iter_elements().iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
