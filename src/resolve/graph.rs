//! Reference graph over unit indices, with cycle reporting.

use std::collections::{BTreeSet, HashMap, VecDeque};

use common::diagnostics::DiagnosticCode;
use common::span::SourceLocation;

use super::{SymbolTable, UnitId};
use crate::sink::Sink;

/// A reference from one unit to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    /// The referenced unit.
    pub target: UnitId,
    /// Where the reference is written.
    pub location: SourceLocation,
}

/// Adjacency lists indexed by [`UnitId`].
#[derive(Clone, Debug, Default)]
pub struct ReferenceGraph {
    edges: Vec<Vec<Edge>>,
}

impl ReferenceGraph {
    /// Creates a graph with `count` units and no edges.
    #[must_use]
    pub fn with_units(count: usize) -> Self {
        Self {
            edges: vec![Vec::new(); count],
        }
    }

    /// Records that `from` references `to` at `location`.
    pub fn add_edge(&mut self, from: UnitId, to: UnitId, location: SourceLocation) {
        if let Some(edges) = self.edges.get_mut(from.index()) {
            edges.push(Edge {
                target: to,
                location,
            });
        }
    }

    /// Returns the outgoing references of `unit` in source order.
    #[must_use]
    pub fn edges(&self, unit: UnitId) -> &[Edge] {
        self.edges
            .get(unit.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `seeds` plus every unit that transitively references one.
    #[must_use]
    pub fn dependents_closure(&self, seeds: impl IntoIterator<Item = UnitId>) -> BTreeSet<UnitId> {
        let mut reverse: HashMap<UnitId, Vec<UnitId>> = HashMap::new();
        for (index, edges) in self.edges.iter().enumerate() {
            for edge in edges {
                reverse.entry(edge.target).or_default().push(UnitId(index));
            }
        }

        let mut closed = BTreeSet::new();
        let mut queue: VecDeque<UnitId> = seeds.into_iter().collect();
        while let Some(unit) = queue.pop_front() {
            if !closed.insert(unit) {
                continue;
            }
            if let Some(sources) = reverse.get(&unit) {
                queue.extend(sources.iter().copied());
            }
        }
        closed
    }

    fn edge_location(&self, from: UnitId, to: UnitId) -> Option<SourceLocation> {
        self.edges(from)
            .iter()
            .find(|edge| edge.target == to)
            .map(|edge| edge.location)
    }

    /// Reports one `reference-cycle` error per strongly connected component
    /// that contains a cycle, and returns every unit on a cycle.
    ///
    /// The message spells out the shortest cycle through the component's
    /// first unit and names any other member; every reference inside the
    /// component is attached as a related site.
    pub fn report_cycles(&self, table: &SymbolTable<'_>, sink: Sink<'_>) -> BTreeSet<UnitId> {
        let mut cyclic = BTreeSet::new();
        for component in self.components() {
            let Some(&start) = component.iter().min() else {
                continue;
            };
            let is_cycle = component.len() > 1 || self.edge_location(start, start).is_some();
            if !is_cycle {
                continue;
            }
            let name = |unit: UnitId| {
                table
                    .unit(unit)
                    .map_or_else(|| format!("#{}", unit.index()), |found| found.key.to_string())
            };
            let path = self.cycle_path(start, &component);
            let mut message = path
                .iter()
                .chain(std::iter::once(&start))
                .map(|unit| name(*unit))
                .collect::<Vec<_>>()
                .join(" -> ");
            let mut others: Vec<UnitId> = component
                .iter()
                .copied()
                .filter(|unit| !path.contains(unit))
                .collect();
            others.sort_unstable();
            if !others.is_empty() {
                let listed: Vec<String> = others.iter().map(|unit| name(*unit)).collect();
                message = format!("{message} (also through {})", listed.join(", "));
            }

            let next = |position: usize| path.get(position + 1).copied().unwrap_or(start);
            let location = self
                .edge_location(start, next(0))
                .or_else(|| table.unit(start).map(|unit| unit.location))
                .unwrap_or_default();
            let mut builder = sink
                .at(
                    DiagnosticCode::ReferenceCycle,
                    location,
                    format!("reference cycle: {message}"),
                )
                .message_id(name(start))
                .note("every message on the cycle is left out of the generated code");
            for (from, to, site) in self.cycle_sites(&path, &component) {
                builder = builder.related(
                    sink.origin(site),
                    format!("`{}` references `{}` here", name(from), name(to)),
                );
            }
            sink.push(builder.build());
            cyclic.extend(component);
        }
        cyclic
    }

    /// References inside `component` other than the one the report points
    /// at: the rest of `path` first, then the remaining edges in unit order.
    fn cycle_sites(
        &self,
        path: &[UnitId],
        component: &[UnitId],
    ) -> Vec<(UnitId, UnitId, SourceLocation)> {
        let Some(&start) = path.first() else {
            return Vec::new();
        };
        let members: BTreeSet<UnitId> = component.iter().copied().collect();
        let mut seen: BTreeSet<(UnitId, UnitId)> = BTreeSet::new();
        let mut sites = Vec::new();
        let along_path = path
            .iter()
            .copied()
            .zip(path.iter().copied().skip(1).chain(std::iter::once(start)));
        for (from, to) in along_path {
            let first = seen.is_empty();
            seen.insert((from, to));
            if first {
                continue;
            }
            if let Some(site) = self.edge_location(from, to) {
                sites.push((from, to, site));
            }
        }
        for &from in &members {
            for edge in self.edges(from) {
                if members.contains(&edge.target) && seen.insert((from, edge.target)) {
                    sites.push((from, edge.target, edge.location));
                }
            }
        }
        sites
    }

    /// Shortest path from `start` through `component` that returns to it.
    fn cycle_path(&self, start: UnitId, component: &[UnitId]) -> Vec<UnitId> {
        let members: BTreeSet<UnitId> = component.iter().copied().collect();
        let mut parent: HashMap<UnitId, UnitId> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut closing = None;
        while let Some(unit) = queue.pop_front() {
            if self.edges(unit).iter().any(|edge| edge.target == start) {
                closing = Some(unit);
                break;
            }
            for edge in self.edges(unit) {
                if members.contains(&edge.target)
                    && edge.target != start
                    && !parent.contains_key(&edge.target)
                {
                    parent.insert(edge.target, unit);
                    queue.push_back(edge.target);
                }
            }
        }

        let mut path = Vec::new();
        let mut cursor = closing.unwrap_or(start);
        while cursor != start {
            path.push(cursor);
            cursor = parent.get(&cursor).copied().unwrap_or(start);
        }
        path.push(start);
        path.reverse();
        path
    }

    /// Strongly connected components, via Tarjan's algorithm.
    ///
    /// A component is listed only after every component it references, so
    /// walking the result front to back visits callees before callers.
    #[must_use]
    pub fn components(&self) -> Vec<Vec<UnitId>> {
        let mut tarjan = Tarjan {
            graph: self,
            visits: vec![Visit::default(); self.edges.len()],
            stack: Vec::new(),
            counter: 0,
            components: Vec::new(),
        };
        for unit in (0..self.edges.len()).map(UnitId) {
            if tarjan.visit_of(unit).order.is_none() {
                tarjan.visit(unit);
            }
        }
        tarjan.components
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Visit {
    order: Option<usize>,
    lowlink: usize,
    on_stack: bool,
}

struct Tarjan<'g> {
    graph: &'g ReferenceGraph,
    visits: Vec<Visit>,
    stack: Vec<UnitId>,
    counter: usize,
    components: Vec<Vec<UnitId>>,
}

impl Tarjan<'_> {
    fn visit_of(&self, unit: UnitId) -> Visit {
        self.visits.get(unit.index()).copied().unwrap_or_default()
    }

    fn lower(&mut self, unit: UnitId, bound: usize) {
        if let Some(visit) = self.visits.get_mut(unit.index()) {
            visit.lowlink = visit.lowlink.min(bound);
        }
    }

    fn enter(&mut self, unit: UnitId) {
        if let Some(visit) = self.visits.get_mut(unit.index()) {
            *visit = Visit {
                order: Some(self.counter),
                lowlink: self.counter,
                on_stack: true,
            };
        }
        self.counter += 1;
        self.stack.push(unit);
    }

    /// Depth-first search from `root` with an explicit frame stack, so long
    /// reference chains cannot exhaust the thread's stack.
    fn visit(&mut self, root: UnitId) {
        let graph = self.graph;
        // Each frame is a unit and the index of its next unexplored edge.
        let mut frames: Vec<(UnitId, usize)> = vec![(root, 0)];
        self.enter(root);
        while let Some(frame) = frames.last_mut() {
            let (unit, next) = *frame;
            if let Some(edge) = graph.edges(unit).get(next) {
                frame.1 = next + 1;
                let target = self.visit_of(edge.target);
                match target.order {
                    None => {
                        self.enter(edge.target);
                        frames.push((edge.target, 0));
                    }
                    Some(order) if target.on_stack => self.lower(unit, order),
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            let finished = self.visit_of(unit);
            if let Some(&(parent, _)) = frames.last() {
                self.lower(parent, finished.lowlink);
            }
            if finished.order == Some(finished.lowlink) {
                self.close(unit);
            }
        }
    }

    fn close(&mut self, root: UnitId) {
        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            if let Some(visit) = self.visits.get_mut(member.index()) {
                visit.on_stack = false;
            }
            component.push(member);
            if member == root {
                break;
            }
        }
        self.components.push(component);
    }
}
