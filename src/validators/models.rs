//! Content model automaton
//!
//! [`ContentAutomaton`] decides, one child element name at a time, whether
//! the children of an element follow the content model of its type. The
//! state is a stack of frames, one per model group occurrence currently
//! open, each holding the progress marker of its compositor:
//!
//! - a sequence remembers the member it is at and how often it matched;
//! - a choice remembers the branch it committed to;
//! - an all group counts every member.
//!
//! Matching takes the first alternative in declaration order and never
//! backtracks. When a name cannot be matched, a sequence look-ahead skips
//! missing required members so that a single absent child is reported once
//! and the following children still validate.

use std::fmt;

use crate::error::Result;
use crate::namespaces::QName;

use super::complex_types::TypeKey;
use super::elements::ElementKey;
use super::groups::{ModelType, Particle};
use super::schemas::SchemaTypeSystem;
use super::wildcards::Wildcard;

/// A name that would be accepted next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// An element declaration
    Element(QName),
    /// A wildcard, in its namespace constraint notation
    Wildcard(String),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(name) => write!(f, "{}", name),
            Self::Wildcard(constraint) => write!(f, "{}", constraint),
        }
    }
}

/// Content model violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// A required child is absent
    Missing {
        /// What would satisfy the requirement
        expected: Vec<Expected>,
    },
    /// A child cannot be matched at its position
    Unexpected {
        /// The child name
        name: QName,
        /// What would have been valid instead
        expected: Vec<Expected>,
    },
    /// A substitution group member ruled out by its head
    SubstitutionFinal {
        /// The member name
        name: QName,
        /// The head it tried to replace
        head: QName,
    },
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { expected } => {
                write!(f, "missing required element {}", join(expected))
            }
            Self::Unexpected { name, expected } if expected.is_empty() => {
                write!(f, "element '{}' is not allowed here", name)
            }
            Self::Unexpected { name, expected } => write!(
                f,
                "unexpected element '{}', expected {}",
                name,
                join(expected)
            ),
            Self::SubstitutionFinal { name, head } => write!(
                f,
                "element '{}' may not substitute for '{}'",
                name, head
            ),
        }
    }
}

fn join(expected: &[Expected]) -> String {
    expected
        .iter()
        .map(|e| format!("'{}'", e))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// What a child name matched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Matched<'a> {
    /// An element declaration, possibly a substitution group member
    Element(ElementKey),
    /// A wildcard
    Wildcard(&'a Wildcard),
}

/// Outcome of feeding one child name
#[derive(Debug, Clone, PartialEq)]
pub enum Step<'a> {
    /// Matched at the current position
    Accepted(Matched<'a>),
    /// Matched after skipping required children, which are reported
    Recovered(Matched<'a>, Vec<ContentError>),
    /// Not matched; the state is unchanged
    Rejected(ContentError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Sequence { index: usize, count: u32 },
    Choice { branch: Option<usize>, count: u32 },
    All { counts: Vec<u32> },
}

#[derive(Debug, Clone)]
struct Frame<'a> {
    particles: &'a [Particle],
    state: State,
}

impl<'a> Frame<'a> {
    fn new(model: ModelType, particles: &'a [Particle]) -> Self {
        let state = match model {
            ModelType::Sequence => State::Sequence { index: 0, count: 0 },
            ModelType::Choice => State::Choice {
                branch: None,
                count: 0,
            },
            ModelType::All => State::All {
                counts: vec![0; particles.len()],
            },
        };
        Self { particles, state }
    }
}

enum Decision<'a> {
    Match(Matched<'a>),
    Descend(ModelType, &'a [Particle]),
    NoMatch,
}

/// Whether `count` occurrences of `particle` satisfy its lower bound
fn satisfied(particle: &Particle, count: u32) -> bool {
    !particle.occurs().is_missing(count) || particle.is_empty_term()
}

/// Incremental matcher for the children of one element
#[derive(Debug, Clone)]
pub struct ContentAutomaton<'a> {
    system: &'a SchemaTypeSystem,
    stack: Vec<Frame<'a>>,
}

impl<'a> ContentAutomaton<'a> {
    /// Automaton for the content model of a type
    pub fn new(system: &'a SchemaTypeSystem, type_key: TypeKey) -> Result<Self> {
        let root = system.content_model(type_key)?;
        Ok(Self::for_particle(system, root))
    }

    /// Automaton for a single particle, or for empty content
    pub fn for_particle(system: &'a SchemaTypeSystem, root: Option<&'a Particle>) -> Self {
        let stack = root
            .map(|particle| {
                vec![Frame::new(
                    ModelType::Sequence,
                    std::slice::from_ref(particle),
                )]
            })
            .unwrap_or_default();
        Self { system, stack }
    }

    /// Feed the name of the next child element
    pub fn step(&mut self, name: &QName) -> Step<'a> {
        let mut stack = self.stack.clone();
        loop {
            if let Some(matched) = self.accept(&mut stack, name) {
                log::trace!("content step {} accepted", name);
                self.stack = stack;
                return Step::Accepted(matched);
            }
            let done = stack.len() > 1
                && stack.last().is_some_and(|top| self.is_frame_satisfied(top));
            if !done {
                break;
            }
            stack.pop();
        }

        if let Some((stack, matched, missing)) = self.recover(name) {
            log::trace!("content step {} recovered past {} missing", name, missing.len());
            self.stack = stack;
            return Step::Recovered(matched, missing);
        }

        log::trace!("content step {} rejected", name);
        Step::Rejected(self.rejection(name))
    }

    /// Names that would be accepted next
    pub fn expected(&self) -> Vec<Expected> {
        let mut expected = Vec::new();
        for particle in self.next_terms(&self.stack) {
            let item = match particle {
                Particle::Element(e) => Expected::Element(e.name.clone()),
                Particle::Wildcard(w) => Expected::Wildcard(w.wildcard.namespace.to_string()),
                Particle::Group(_) => continue,
            };
            if !expected.contains(&item) {
                expected.push(item);
            }
        }
        expected
    }

    /// Whether the children seen so far form complete content
    pub fn is_stoppable(&self) -> bool {
        self.stack.iter().all(|frame| self.is_frame_satisfied(frame))
    }

    /// Report every required child still missing
    pub fn finish(&self) -> Vec<ContentError> {
        self.stack
            .iter()
            .rev()
            .flat_map(|frame| self.frame_missing(frame))
            .collect()
    }

    // Matching

    fn accept(&self, stack: &mut Vec<Frame<'a>>, name: &QName) -> Option<Matched<'a>> {
        loop {
            let frame = stack.last_mut()?;
            match self.decide(frame, name) {
                Decision::Match(matched) => return Some(matched),
                Decision::Descend(model, particles) => stack.push(Frame::new(model, particles)),
                Decision::NoMatch => return None,
            }
        }
    }

    /// Try to advance one frame with `name`, updating its marker on success
    fn decide(&self, frame: &mut Frame<'a>, name: &QName) -> Decision<'a> {
        let particles = frame.particles;
        match &mut frame.state {
            State::Sequence { index, count } => {
                while let Some(particle) = particles.get(*index) {
                    if !particle.occurs().is_over(*count) && self.can_start(particle, name) {
                        *count += 1;
                        return self.enter(particle, name);
                    }
                    if !satisfied(particle, *count) {
                        return Decision::NoMatch;
                    }
                    *index += 1;
                    *count = 0;
                }
                Decision::NoMatch
            }
            State::Choice { branch, count } => match *branch {
                Some(i) => {
                    let particle = &particles[i];
                    if !particle.occurs().is_over(*count) && self.can_start(particle, name) {
                        *count += 1;
                        self.enter(particle, name)
                    } else {
                        Decision::NoMatch
                    }
                }
                None => match particles.iter().position(|p| self.can_start(p, name)) {
                    Some(i) => {
                        *branch = Some(i);
                        *count = 1;
                        self.enter(&particles[i], name)
                    }
                    None => Decision::NoMatch,
                },
            },
            State::All { counts } => {
                let found = particles.iter().enumerate().find(|(i, p)| {
                    !p.occurs().is_over(counts[*i]) && self.can_start(p, name)
                });
                match found {
                    Some((i, particle)) => {
                        counts[i] += 1;
                        self.enter(particle, name)
                    }
                    None => Decision::NoMatch,
                }
            }
        }
    }

    fn enter(&self, particle: &'a Particle, name: &QName) -> Decision<'a> {
        match particle {
            Particle::Element(e) => Decision::Match(Matched::Element(
                self.substitute(e.element, name).unwrap_or(e.element),
            )),
            Particle::Wildcard(w) => Decision::Match(Matched::Wildcard(&w.wildcard)),
            Particle::Group(g) => Decision::Descend(g.model, &g.particles),
        }
    }

    /// Declaration matching `name` among the admitted members of `head`
    fn substitute(&self, head: ElementKey, name: &QName) -> Option<ElementKey> {
        if &self.system.element(head).name == name {
            return Some(head);
        }
        self.system
            .substitution_group(head)?
            .members
            .iter()
            .copied()
            .find(|&member| &self.system.element(member).name == name)
    }

    /// Whether an occurrence of `particle` can begin with `name`
    fn can_start(&self, particle: &Particle, name: &QName) -> bool {
        if particle.occurs().is_empty() {
            return false;
        }
        match particle {
            Particle::Element(e) => self.substitute(e.element, name).is_some(),
            Particle::Wildcard(w) => w.wildcard.matches(name),
            Particle::Group(g) => match g.model {
                ModelType::Sequence => {
                    for child in &g.particles {
                        if self.can_start(child, name) {
                            return true;
                        }
                        if !child.is_emptiable() {
                            return false;
                        }
                    }
                    false
                }
                ModelType::Choice | ModelType::All => {
                    g.particles.iter().any(|child| self.can_start(child, name))
                }
            },
        }
    }

    fn is_frame_satisfied(&self, frame: &Frame<'a>) -> bool {
        match &frame.state {
            State::Sequence { index, count } => frame
                .particles
                .iter()
                .enumerate()
                .skip(*index)
                .all(|(i, p)| satisfied(p, if i == *index { *count } else { 0 })),
            State::Choice { branch: None, .. } => {
                frame.particles.is_empty() || frame.particles.iter().any(Particle::is_emptiable)
            }
            State::Choice {
                branch: Some(i),
                count,
            } => satisfied(&frame.particles[*i], *count),
            State::All { counts } => frame
                .particles
                .iter()
                .zip(counts)
                .all(|(p, &count)| satisfied(p, count)),
        }
    }

    // Recovery and reporting

    /// Skip ahead in an enclosing sequence to a member that can take `name`
    fn recover(&self, name: &QName) -> Option<(Vec<Frame<'a>>, Matched<'a>, Vec<ContentError>)> {
        for depth in (0..self.stack.len()).rev() {
            let frame = &self.stack[depth];
            let State::Sequence { index, count } = frame.state else {
                continue;
            };
            for target in index..frame.particles.len() {
                if target == index && count > 0 {
                    continue;
                }
                let particle = &frame.particles[target];
                let mut inner = Vec::new();
                let entered = if target > index && self.can_start(particle, name) {
                    Vec::new()
                } else {
                    match self.skip_into(particle, name, &mut inner) {
                        Some(frames) => frames,
                        None => continue,
                    }
                };

                let mut missing: Vec<ContentError> = self.stack[depth + 1..]
                    .iter()
                    .rev()
                    .flat_map(|f| self.frame_missing(f))
                    .collect();
                if target > index {
                    if let Some(current) = frame.particles.get(index) {
                        if !satisfied(current, count) {
                            missing.extend(self.particle_missing(current, count));
                        }
                    }
                    for skipped in &frame.particles[index + 1..target] {
                        if !skipped.is_emptiable() {
                            missing.extend(self.particle_missing(skipped, 0));
                        }
                    }
                }
                missing.append(&mut inner);

                let mut stack = self.stack[..=depth].to_vec();
                stack[depth].state = State::Sequence {
                    index: target,
                    count: u32::from(!entered.is_empty()),
                };
                stack.extend(entered);
                if let Some(matched) = self.accept(&mut stack, name) {
                    return Some((stack, matched, missing));
                }
            }
        }
        None
    }

    /// Frames opening a fresh occurrence of the group `particle`, positioned
    /// at the first member that can take `name`; required members passed
    /// over are added to `missing`
    fn skip_into(
        &self,
        particle: &'a Particle,
        name: &QName,
        missing: &mut Vec<ContentError>,
    ) -> Option<Vec<Frame<'a>>> {
        let Particle::Group(group) = particle else {
            return None;
        };
        if particle.occurs().is_empty() {
            return None;
        }
        let particles: &'a [Particle] = &group.particles;
        match group.model {
            ModelType::Sequence => {
                for (target, member) in particles.iter().enumerate() {
                    let mut inner = Vec::new();
                    let entered = if self.can_start(member, name) {
                        Vec::new()
                    } else {
                        match self.skip_into(member, name, &mut inner) {
                            Some(frames) => frames,
                            None => continue,
                        }
                    };
                    for skipped in &particles[..target] {
                        if !skipped.is_emptiable() {
                            missing.extend(self.particle_missing(skipped, 0));
                        }
                    }
                    missing.append(&mut inner);

                    let mut frames = vec![Frame {
                        particles,
                        state: State::Sequence {
                            index: target,
                            count: u32::from(!entered.is_empty()),
                        },
                    }];
                    frames.extend(entered);
                    return Some(frames);
                }
                None
            }
            ModelType::Choice => {
                for (branch, member) in particles.iter().enumerate() {
                    let mut inner = Vec::new();
                    if let Some(entered) = self.skip_into(member, name, &mut inner) {
                        missing.append(&mut inner);
                        let mut frames = vec![Frame {
                            particles,
                            state: State::Choice {
                                branch: Some(branch),
                                count: 1,
                            },
                        }];
                        frames.extend(entered);
                        return Some(frames);
                    }
                }
                None
            }
            ModelType::All => None,
        }
    }

    fn rejection(&self, name: &QName) -> ContentError {
        for particle in self.next_terms(&self.stack) {
            if let Particle::Element(e) = particle {
                let excluded = self
                    .system
                    .substitution_group(e.element)
                    .map(|group| {
                        group
                            .excluded
                            .iter()
                            .any(|&member| &self.system.element(member).name == name)
                    })
                    .unwrap_or(false);
                if excluded {
                    return ContentError::SubstitutionFinal {
                        name: name.clone(),
                        head: e.name.clone(),
                    };
                }
            }
        }
        ContentError::Unexpected {
            name: name.clone(),
            expected: self.expected(),
        }
    }

    /// Element and wildcard terms that may come next
    fn next_terms(&self, stack: &[Frame<'a>]) -> Vec<&'a Particle> {
        let mut terms = Vec::new();
        for frame in stack.iter().rev() {
            match &frame.state {
                State::Sequence { index, count } => {
                    for (i, particle) in frame.particles.iter().enumerate().skip(*index) {
                        let count = if i == *index { *count } else { 0 };
                        if !particle.occurs().is_over(count) {
                            first_terms(particle, &mut terms);
                        }
                        if !satisfied(particle, count) {
                            break;
                        }
                    }
                }
                State::Choice { branch: None, .. } => {
                    for particle in frame.particles {
                        first_terms(particle, &mut terms);
                    }
                }
                State::Choice {
                    branch: Some(i),
                    count,
                } => {
                    let particle = &frame.particles[*i];
                    if !particle.occurs().is_over(*count) {
                        first_terms(particle, &mut terms);
                    }
                }
                State::All { counts } => {
                    for (particle, &count) in frame.particles.iter().zip(counts) {
                        if !particle.occurs().is_over(count) {
                            first_terms(particle, &mut terms);
                        }
                    }
                }
            }
            if !self.is_frame_satisfied(frame) {
                break;
            }
        }
        terms
    }

    fn frame_missing(&self, frame: &Frame<'a>) -> Vec<ContentError> {
        let mut missing = Vec::new();
        match &frame.state {
            State::Sequence { index, count } => {
                for (i, particle) in frame.particles.iter().enumerate().skip(*index) {
                    let count = if i == *index { *count } else { 0 };
                    if !satisfied(particle, count) {
                        missing.extend(self.particle_missing(particle, count));
                    }
                }
            }
            State::Choice { branch: None, .. } => {
                if !self.is_frame_satisfied(frame) {
                    missing.push(ContentError::Missing {
                        expected: expected_of(frame.particles),
                    });
                }
            }
            State::Choice {
                branch: Some(i),
                count,
            } => {
                let particle = &frame.particles[*i];
                if !satisfied(particle, *count) {
                    missing.extend(self.particle_missing(particle, *count));
                }
            }
            State::All { counts } => {
                for (particle, &count) in frame.particles.iter().zip(counts) {
                    if !satisfied(particle, count) {
                        missing.extend(self.particle_missing(particle, count));
                    }
                }
            }
        }
        missing
    }

    /// Missing reports for a particle seen `count` times
    fn particle_missing(&self, particle: &Particle, count: u32) -> Vec<ContentError> {
        match particle {
            Particle::Group(g) if count == 0 => match g.model {
                ModelType::Sequence | ModelType::All => g
                    .particles
                    .iter()
                    .filter(|p| !p.is_emptiable())
                    .flat_map(|p| self.particle_missing(p, 0))
                    .collect(),
                ModelType::Choice => vec![ContentError::Missing {
                    expected: expected_of(&g.particles),
                }],
            },
            other => vec![ContentError::Missing {
                expected: expected_of(std::slice::from_ref(other)),
            }],
        }
    }
}

/// Collect the element and wildcard terms an occurrence of `particle` may start with
fn first_terms<'a>(particle: &'a Particle, terms: &mut Vec<&'a Particle>) {
    match particle {
        Particle::Element(_) | Particle::Wildcard(_) => terms.push(particle),
        Particle::Group(g) => match g.model {
            ModelType::Sequence => {
                for child in &g.particles {
                    first_terms(child, terms);
                    if !child.is_emptiable() {
                        break;
                    }
                }
            }
            ModelType::Choice | ModelType::All => {
                for child in &g.particles {
                    first_terms(child, terms);
                }
            }
        },
    }
}

fn expected_of(particles: &[Particle]) -> Vec<Expected> {
    let mut terms = Vec::new();
    for particle in particles {
        first_terms(particle, &mut terms);
    }
    let mut expected = Vec::new();
    for term in terms {
        let item = match term {
            Particle::Element(e) => Expected::Element(e.name.clone()),
            Particle::Wildcard(w) => Expected::Wildcard(w.wildcard.namespace.to_string()),
            Particle::Group(_) => continue,
        };
        if !expected.contains(&item) {
            expected.push(item);
        }
    }
    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::declarations::{
        ElementDef, ParticleDef, SchemaDocument, TypeDef,
    };
    use crate::validators::particles::Occurs;
    use crate::validators::wildcards::{NamespaceConstraint, ProcessContents};

    fn q(name: &str) -> QName {
        QName::local(name)
    }

    fn element(name: &str) -> ParticleDef {
        ParticleDef::element(ElementDef::new(q(name)))
    }

    fn system_with(particle: ParticleDef) -> SchemaTypeSystem {
        let document = SchemaDocument::new("test.xsd")
            .with_type(TypeDef::complex(Some(q("T"))).with_particle(particle));
        SchemaTypeSystem::compile(vec![document]).unwrap()
    }

    fn automaton(system: &SchemaTypeSystem) -> ContentAutomaton<'_> {
        ContentAutomaton::new(system, system.type_key(&q("T")).unwrap()).unwrap()
    }

    fn is_accepted(step: &Step<'_>) -> bool {
        matches!(step, Step::Accepted(_))
    }

    #[test]
    fn test_sequence_in_order() {
        let system = system_with(ParticleDef::sequence(vec![
            element("a"),
            element("b").with_occurs(Occurs::optional()),
            element("c"),
        ]));
        let mut automaton = automaton(&system);
        assert!(!automaton.is_stoppable());
        assert!(is_accepted(&automaton.step(&q("a"))));
        assert_eq!(
            automaton.expected(),
            vec![Expected::Element(q("b")), Expected::Element(q("c"))]
        );
        assert!(is_accepted(&automaton.step(&q("c"))));
        assert!(automaton.is_stoppable());
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_sequence_out_of_order() {
        let system = system_with(ParticleDef::sequence(vec![element("a"), element("b")]));
        let mut automaton = automaton(&system);
        match automaton.step(&q("x")) {
            Step::Rejected(ContentError::Unexpected { name, expected }) => {
                assert_eq!(name, q("x"));
                assert_eq!(expected, vec![Expected::Element(q("a"))]);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(matches!(automaton.step(&q("b")), Step::Recovered(..)));
        assert!(matches!(
            automaton.step(&q("a")),
            Step::Rejected(ContentError::Unexpected { .. })
        ));
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_missing_first_child_reported_once() {
        let system = system_with(ParticleDef::sequence(vec![
            element("a"),
            element("b"),
            element("c"),
        ]));
        let mut automaton = automaton(&system);
        match automaton.step(&q("b")) {
            Step::Recovered(Matched::Element(_), missing) => assert_eq!(
                missing,
                vec![ContentError::Missing {
                    expected: vec![Expected::Element(q("a"))]
                }]
            ),
            other => panic!("unexpected step {:?}", other),
        }
        assert!(is_accepted(&automaton.step(&q("c"))));
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_missing_first_child_in_nested_groups() {
        let system = system_with(ParticleDef::sequence(vec![
            ParticleDef::sequence(vec![element("a"), element("b")]),
            ParticleDef::choice(vec![
                ParticleDef::sequence(vec![element("c"), element("d")]),
                element("e"),
            ]),
        ]));
        let mut automaton = automaton(&system);
        match automaton.step(&q("b")) {
            Step::Recovered(_, missing) => assert_eq!(
                missing,
                vec![ContentError::Missing {
                    expected: vec![Expected::Element(q("a"))]
                }]
            ),
            other => panic!("unexpected step {:?}", other),
        }
        match automaton.step(&q("d")) {
            Step::Recovered(_, missing) => assert_eq!(
                missing,
                vec![ContentError::Missing {
                    expected: vec![Expected::Element(q("c"))]
                }]
            ),
            other => panic!("unexpected step {:?}", other),
        }
        assert!(automaton.is_stoppable());
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_missing_child_reported_once() {
        let system = system_with(ParticleDef::sequence(vec![
            element("a"),
            element("b"),
            element("c"),
        ]));
        let mut automaton = automaton(&system);
        assert!(is_accepted(&automaton.step(&q("a"))));
        match automaton.step(&q("c")) {
            Step::Recovered(_, missing) => assert_eq!(
                missing,
                vec![ContentError::Missing {
                    expected: vec![Expected::Element(q("b"))]
                }]
            ),
            other => panic!("unexpected step {:?}", other),
        }
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_choice_commits_to_branch() {
        let system = system_with(ParticleDef::choice(vec![element("a"), element("b")]));
        let mut automaton = automaton(&system);
        assert!(is_accepted(&automaton.step(&q("a"))));
        assert!(matches!(
            automaton.step(&q("a")),
            Step::Rejected(ContentError::Unexpected { .. })
        ));
        assert!(matches!(
            automaton.step(&q("b")),
            Step::Rejected(ContentError::Unexpected { .. })
        ));
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_repeated_choice() {
        let system = system_with(
            ParticleDef::choice(vec![element("a"), element("b")])
                .with_occurs(Occurs::zero_or_more()),
        );
        let mut automaton = automaton(&system);
        for name in ["a", "b", "b", "a"] {
            assert!(is_accepted(&automaton.step(&q(name))), "{}", name);
        }
        assert!(automaton.is_stoppable());
    }

    #[test]
    fn test_all_group_any_order() {
        let system = system_with(ParticleDef::all(vec![
            element("a"),
            element("b"),
            element("c").with_occurs(Occurs::optional()),
        ]));
        let mut automaton = automaton(&system);
        assert!(is_accepted(&automaton.step(&q("b"))));
        assert!(is_accepted(&automaton.step(&q("a"))));
        assert!(automaton.finish().is_empty());
        assert!(!is_accepted(&automaton.step(&q("a"))));

        let mut partial = ContentAutomaton::new(&system, system.type_key(&q("T")).unwrap()).unwrap();
        assert!(is_accepted(&partial.step(&q("c"))));
        assert_eq!(partial.finish().len(), 2);
    }

    #[test]
    fn test_wildcard() {
        let other = Wildcard::new(
            NamespaceConstraint::Other {
                target_namespace: Some("urn:t".to_string()),
            },
            ProcessContents::Skip,
        );
        let system = system_with(ParticleDef::sequence(vec![
            element("a"),
            ParticleDef::any(other).with_occurs(Occurs::zero_or_more()),
        ]));
        let mut automaton = automaton(&system);
        assert!(is_accepted(&automaton.step(&q("a"))));
        assert!(matches!(
            automaton.step(&QName::namespaced("urn:x", "ext")),
            Step::Accepted(Matched::Wildcard(_))
        ));
        assert!(!is_accepted(&automaton.step(&QName::namespaced("urn:t", "ext"))));
        assert!(!is_accepted(&automaton.step(&q("local"))));
    }

    #[test]
    fn test_nested_groups() {
        let system = system_with(ParticleDef::sequence(vec![
            ParticleDef::sequence(vec![element("a"), element("b")])
                .with_occurs(Occurs::new(1, Some(2))),
            element("c"),
        ]));
        let mut automaton = automaton(&system);
        for name in ["a", "b", "a", "b", "c"] {
            assert!(is_accepted(&automaton.step(&q(name))), "{}", name);
        }
        assert!(automaton.finish().is_empty());
    }

    #[test]
    fn test_empty_content() {
        let system = SchemaTypeSystem::compile(vec![
            SchemaDocument::new("e.xsd").with_type(TypeDef::complex(Some(q("T")))),
        ])
        .unwrap();
        let mut automaton = automaton(&system);
        assert!(automaton.is_stoppable());
        assert!(automaton.expected().is_empty());
        assert_eq!(
            automaton.step(&q("x")),
            Step::Rejected(ContentError::Unexpected {
                name: q("x"),
                expected: vec![]
            })
        );
    }
}
