//! Subject/segment registry.
//!
//! Segment nodes live in a `Slab`; parent and child links are slab keys.
//! Each subject keeps its keys in breadth-first order from the root, so a
//! single forward pass always visits parents before children.

use std::collections::{HashMap, HashSet, VecDeque};

use contracts::{Name, SegmentId, SubjectDescription, Transform};
use slab::Slab;
use thiserror::Error;

/// Reasons a subject description is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("subject has no segments")]
    Empty,

    #[error("subject listed more than once")]
    DuplicateSubject,

    #[error("duplicate segment '{0}'")]
    DuplicateSegment(Name),

    #[error("no root segment")]
    NoRoot,

    #[error("multiple root segments: '{0}' and '{1}'")]
    MultipleRoots(Name, Name),

    #[error("segment '{segment}' names unknown parent '{parent}'")]
    UnknownParent { segment: Name, parent: Name },

    #[error("segment '{0}' is not reachable from the root")]
    Cycle(Name),
}

/// One registered segment
#[derive(Debug, Clone)]
pub struct SegmentNode {
    pub name: Name,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub static_transform: Transform,
    pub static_scale: [f64; 3],
}

/// One registered subject
#[derive(Debug, Clone)]
pub struct SubjectEntry {
    pub name: Name,
    pub root: usize,
    /// Slab keys, parents before children
    order: Vec<usize>,
    index: HashMap<Name, usize>,
}

impl SubjectEntry {
    pub fn segment_keys(&self) -> &[usize] {
        &self.order
    }

    pub fn segment_key(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Outcome of applying a topology update
#[derive(Debug, Default)]
pub struct TopologyUpdate {
    pub added: Vec<Name>,
    pub removed: Vec<Name>,
    pub rejected: Vec<(Name, TopologyError)>,
}

/// Registry of subjects and their segment hierarchies
#[derive(Debug, Default)]
pub struct Registry {
    segments: Slab<SegmentNode>,
    subjects: Vec<SubjectEntry>,
    subject_index: HashMap<Name, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subject set with `descriptions`.
    ///
    /// Invalid subjects are skipped and reported in `rejected`.
    pub fn apply_topology(&mut self, descriptions: &[SubjectDescription]) -> TopologyUpdate {
        let previous: HashSet<Name> = self.subjects.iter().map(|s| s.name.clone()).collect();

        self.segments.clear();
        self.subjects.clear();
        self.subject_index.clear();

        let mut update = TopologyUpdate::default();
        for description in descriptions {
            if self.subject_index.contains_key(description.name.as_str()) {
                update
                    .rejected
                    .push((description.name.clone(), TopologyError::DuplicateSubject));
                continue;
            }
            match self.insert_subject(description) {
                Ok(()) => {
                    if !previous.contains(description.name.as_str()) {
                        update.added.push(description.name.clone());
                    }
                }
                Err(error) => update.rejected.push((description.name.clone(), error)),
            }
        }

        update.removed = previous
            .into_iter()
            .filter(|name| !self.subject_index.contains_key(name.as_str()))
            .collect();
        update.removed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        update
    }

    fn insert_subject(&mut self, description: &SubjectDescription) -> Result<(), TopologyError> {
        let order = breadth_first_order(description)?;

        // description index -> slab key
        let mut keys = vec![usize::MAX; description.segments.len()];
        for &i in &order {
            let segment = &description.segments[i];
            keys[i] = self.segments.insert(SegmentNode {
                name: segment.name.clone(),
                parent: None,
                children: Vec::new(),
                static_transform: segment.static_transform,
                static_scale: segment.static_scale,
            });
        }

        let position: HashMap<&str, usize> = description
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        for &i in &order {
            let Some(parent_name) = description.segments[i].parent.as_ref() else {
                continue;
            };
            let Some(&p) = position.get(parent_name.as_str()) else {
                continue;
            };
            let (child_key, parent_key) = (keys[i], keys[p]);
            self.segments[child_key].parent = Some(parent_key);
            self.segments[parent_key].children.push(child_key);
        }

        let order: Vec<usize> = order.iter().map(|&i| keys[i]).collect();
        let index = order
            .iter()
            .map(|&key| (self.segments[key].name.clone(), key))
            .collect();

        self.subject_index
            .insert(description.name.clone(), self.subjects.len());
        self.subjects.push(SubjectEntry {
            name: description.name.clone(),
            root: order[0],
            order,
            index,
        });
        Ok(())
    }

    pub fn subjects(&self) -> &[SubjectEntry] {
        &self.subjects
    }

    pub fn subject(&self, name: &str) -> Option<&SubjectEntry> {
        self.subject_index.get(name).map(|&i| &self.subjects[i])
    }

    pub fn segment(&self, key: usize) -> Option<&SegmentNode> {
        self.segments.get(key)
    }

    pub fn contains(&self, id: &SegmentId) -> bool {
        self.subject(&id.subject)
            .and_then(|subject| subject.segment_key(&id.segment))
            .is_some()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Validate one description and return its segment indices, root first,
/// parents before children.
fn breadth_first_order(description: &SubjectDescription) -> Result<Vec<usize>, TopologyError> {
    let segments = &description.segments;
    if segments.is_empty() {
        return Err(TopologyError::Empty);
    }

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        if position.insert(segment.name.as_str(), i).is_some() {
            return Err(TopologyError::DuplicateSegment(segment.name.clone()));
        }
    }

    let mut root = None;
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); segments.len()];
    for (i, segment) in segments.iter().enumerate() {
        match &segment.parent {
            None => match root {
                None => root = Some(i),
                Some(r) => {
                    return Err(TopologyError::MultipleRoots(
                        segments[r].name.clone(),
                        segment.name.clone(),
                    ))
                }
            },
            Some(parent) => match position.get(parent.as_str()) {
                Some(&p) => children[p].push(i),
                None => {
                    return Err(TopologyError::UnknownParent {
                        segment: segment.name.clone(),
                        parent: parent.clone(),
                    })
                }
            },
        }
    }
    let root = root.ok_or(TopologyError::NoRoot)?;

    let mut order = Vec::with_capacity(segments.len());
    let mut visited = vec![false; segments.len()];
    let mut queue = VecDeque::from([root]);
    visited[root] = true;
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &c in &children[i] {
            if !visited[c] {
                visited[c] = true;
                queue.push_back(c);
            }
        }
    }

    if let Some(i) = visited.iter().position(|v| !v) {
        return Err(TopologyError::Cycle(segments[i].name.clone()));
    }
    Ok(order)
}
