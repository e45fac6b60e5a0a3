//! Critical-path analysis over scheduled tasks.
//!
//! Forward pass computes early start/finish, backward pass late start/
//! finish; a task is critical when its total float is below one minute. The
//! pass implementation is picked by graph size — direct two-pass, level-
//! parallel, or in-place over one topological order — and all three yield
//! identical results. A content-hash cache short-circuits repeat analyses.
//!
//! References:
//!   - Kelley & Walker (1959), "Critical-Path Planning and Scheduling"

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use taktplan_core::TaskId;
use thiserror::Error;
use uuid::Uuid;

/// Below this many tasks, the direct two-pass runs.
pub const DIRECT_LIMIT: usize = 100;
/// Below this many tasks, the level-parallel passes run; above, the
/// in-place single-ordering variant.
pub const PARALLEL_LIMIT: usize = 1000;

/// A scheduled task as the analyzer sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathTask {
    pub task_id: TaskId,
    pub duration_minutes: i64,
}

/// Errors during critical-path analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpmError {
    #[error("cannot analyze an empty task set")]
    EmptyGraph,

    #[error("dependency cycle involving {count} tasks")]
    CycleDetected { count: usize },

    #[error("float invariant violated: task {task} has float {float}")]
    NegativeFloat { task: usize, float: i64 },
}

/// Pass results for a whole task set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CriticalPathAnalysis {
    pub earliest_start: Vec<i64>,
    pub earliest_finish: Vec<i64>,
    pub latest_start: Vec<i64>,
    pub latest_finish: Vec<i64>,
    pub total_float: Vec<i64>,
    pub critical: Vec<bool>,
    pub makespan: i64,
    /// One critical chain, earliest-starting first.
    pub critical_path: Vec<usize>,
}

impl CriticalPathAnalysis {
    pub fn critical_task_ids<'a>(&'a self, tasks: &'a [PathTask]) -> impl Iterator<Item = TaskId> + 'a {
        self.critical
            .iter()
            .enumerate()
            .filter(|(_, &c)| c)
            .map(move |(i, _)| tasks[i].task_id)
    }
}

/// Pass implementation, selected by size unless forced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassAlgorithm {
    Direct,
    LevelParallel,
    InPlace,
}

impl PassAlgorithm {
    fn for_size(tasks: usize) -> Self {
        if tasks < DIRECT_LIMIT {
            Self::Direct
        } else if tasks < PARALLEL_LIMIT {
            Self::LevelParallel
        } else {
            Self::InPlace
        }
    }
}

struct Graph {
    durations: Vec<i64>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
    topo: Vec<usize>,
}

impl Graph {
    fn build(tasks: &[PathTask], edges: &[(usize, usize)]) -> Result<Self, CpmError> {
        if tasks.is_empty() {
            return Err(CpmError::EmptyGraph);
        }
        let n = tasks.len();
        let mut predecessors = vec![Vec::new(); n];
        let mut successors = vec![Vec::new(); n];
        for &(from, to) in edges {
            successors[from].push(to);
            predecessors[to].push(from);
        }

        // Kahn's algorithm; also validates acyclicity.
        let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut topo = Vec::with_capacity(n);
        while let Some(node) = queue.pop_front() {
            topo.push(node);
            for &succ in &successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    queue.push_back(succ);
                }
            }
        }
        if topo.len() != n {
            return Err(CpmError::CycleDetected { count: n - topo.len() });
        }

        Ok(Self {
            durations: tasks.iter().map(|t| t.duration_minutes).collect(),
            predecessors,
            successors,
            topo,
        })
    }
}

/// Critical-path analyzer with a content-addressed result cache.
pub struct CriticalPathAnalyzer {
    cache: Mutex<HashMap<u64, Arc<CriticalPathAnalysis>>>,
    hits: AtomicU64,
}

impl CriticalPathAnalyzer {
    pub fn new() -> Self {
        Self { cache: Mutex::new(HashMap::new()), hits: AtomicU64::new(0) }
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Analyze; the pass implementation is chosen by task count.
    pub fn analyze(
        &self,
        tasks: &[PathTask],
        edges: &[(usize, usize)],
    ) -> Result<Arc<CriticalPathAnalysis>, CpmError> {
        self.analyze_with(tasks, edges, PassAlgorithm::for_size(tasks.len()))
    }

    /// Analyze with a forced pass implementation.
    pub fn analyze_with(
        &self,
        tasks: &[PathTask],
        edges: &[(usize, usize)],
        algorithm: PassAlgorithm,
    ) -> Result<Arc<CriticalPathAnalysis>, CpmError> {
        let key = content_key(tasks, edges);
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(hit));
            }
        }

        let graph = Graph::build(tasks, edges)?;
        let (earliest_start, earliest_finish) = match algorithm {
            PassAlgorithm::Direct => forward_direct(&graph),
            PassAlgorithm::LevelParallel => forward_levels(&graph),
            PassAlgorithm::InPlace => forward_in_place(&graph),
        };
        let makespan = earliest_finish.iter().copied().max().unwrap_or(0);
        let (latest_start, latest_finish) = match algorithm {
            PassAlgorithm::Direct => backward_direct(&graph, makespan),
            PassAlgorithm::LevelParallel => backward_levels(&graph, makespan),
            PassAlgorithm::InPlace => backward_in_place(&graph, makespan),
        };

        let n = graph.durations.len();
        let mut total_float = Vec::with_capacity(n);
        let mut critical = Vec::with_capacity(n);
        for i in 0..n {
            let float = latest_start[i] - earliest_start[i];
            if float < 0 {
                return Err(CpmError::NegativeFloat { task: i, float });
            }
            total_float.push(float);
            critical.push(float.abs() < 1);
        }

        let critical_path = extract_path(&graph, &earliest_start, &earliest_finish, &critical);

        let analysis = Arc::new(CriticalPathAnalysis {
            earliest_start,
            earliest_finish,
            latest_start,
            latest_finish,
            total_float,
            critical,
            makespan,
            critical_path,
        });
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::clone(&analysis));
        Ok(analysis)
    }
}

impl Default for CriticalPathAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn content_key(tasks: &[PathTask], edges: &[(usize, usize)]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for task in tasks {
        task.duration_minutes.hash(&mut hasher);
    }
    let mut sorted_edges: Vec<(usize, usize)> = edges.to_vec();
    sorted_edges.sort_unstable();
    sorted_edges.dedup();
    sorted_edges.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Forward / backward passes
// ============================================================================

fn forward_direct(graph: &Graph) -> (Vec<i64>, Vec<i64>) {
    let n = graph.durations.len();
    let mut es = vec![0i64; n];
    let mut ef = vec![0i64; n];
    for &node in &graph.topo {
        es[node] = graph.predecessors[node].iter().map(|&p| ef[p]).max().unwrap_or(0);
        ef[node] = es[node] + graph.durations[node];
    }
    (es, ef)
}

fn backward_direct(graph: &Graph, makespan: i64) -> (Vec<i64>, Vec<i64>) {
    let n = graph.durations.len();
    let mut ls = vec![0i64; n];
    let mut lf = vec![0i64; n];
    for &node in graph.topo.iter().rev() {
        lf[node] = graph.successors[node].iter().map(|&s| ls[s]).min().unwrap_or(makespan);
        ls[node] = lf[node] - graph.durations[node];
    }
    (ls, lf)
}

/// Group nodes into dependency levels; nodes of one level are independent
/// and their pass values compute in parallel.
fn levels(graph: &Graph) -> Vec<Vec<usize>> {
    let n = graph.durations.len();
    let mut level = vec![0usize; n];
    for &node in &graph.topo {
        level[node] = graph.predecessors[node]
            .iter()
            .map(|&p| level[p] + 1)
            .max()
            .unwrap_or(0);
    }
    let depth = level.iter().copied().max().map_or(0, |d| d + 1);
    let mut grouped = vec![Vec::new(); depth];
    for (node, &l) in level.iter().enumerate() {
        grouped[l].push(node);
    }
    grouped
}

fn forward_levels(graph: &Graph) -> (Vec<i64>, Vec<i64>) {
    let n = graph.durations.len();
    let mut es = vec![0i64; n];
    let mut ef = vec![0i64; n];
    for level in levels(graph) {
        let computed: Vec<(usize, i64)> = level
            .par_iter()
            .map(|&node| {
                let start =
                    graph.predecessors[node].iter().map(|&p| ef[p]).max().unwrap_or(0);
                (node, start)
            })
            .collect();
        for (node, start) in computed {
            es[node] = start;
            ef[node] = start + graph.durations[node];
        }
    }
    (es, ef)
}

fn backward_levels(graph: &Graph, makespan: i64) -> (Vec<i64>, Vec<i64>) {
    let n = graph.durations.len();
    let mut ls = vec![0i64; n];
    let mut lf = vec![0i64; n];
    for level in levels(graph).into_iter().rev() {
        let computed: Vec<(usize, i64)> = level
            .par_iter()
            .map(|&node| {
                let finish = graph.successors[node]
                    .iter()
                    .map(|&s| ls[s])
                    .min()
                    .unwrap_or(makespan);
                (node, finish)
            })
            .collect();
        for (node, finish) in computed {
            lf[node] = finish;
            ls[node] = finish - graph.durations[node];
        }
    }
    (ls, lf)
}

fn forward_in_place(graph: &Graph) -> (Vec<i64>, Vec<i64>) {
    let n = graph.durations.len();
    let mut es = vec![0i64; n];
    let mut ef = vec![0i64; n];
    for &node in &graph.topo {
        let finish = es[node] + graph.durations[node];
        ef[node] = finish;
        for &succ in &graph.successors[node] {
            if finish > es[succ] {
                es[succ] = finish;
            }
        }
    }
    (es, ef)
}

fn backward_in_place(graph: &Graph, makespan: i64) -> (Vec<i64>, Vec<i64>) {
    let n = graph.durations.len();
    let mut ls = vec![0i64; n];
    let mut lf = vec![makespan; n];
    for &node in graph.topo.iter().rev() {
        let start = lf[node] - graph.durations[node];
        ls[node] = start;
        for &pred in &graph.predecessors[node] {
            if start < lf[pred] {
                lf[pred] = start;
            }
        }
    }
    (ls, lf)
}

/// Walk one critical chain from the earliest-starting no-predecessor
/// critical task, preferring the lowest-index successor on ties.
fn extract_path(
    graph: &Graph,
    es: &[i64],
    ef: &[i64],
    critical: &[bool],
) -> Vec<usize> {
    let mut starts: Vec<usize> = (0..graph.durations.len())
        .filter(|&i| critical[i] && graph.predecessors[i].is_empty())
        .collect();
    starts.sort_by_key(|&i| (es[i], i));

    let Some(&start) = starts.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = graph.successors[current]
            .iter()
            .copied()
            .filter(|&s| critical[s] && es[s] == ef[current])
            .min_by_key(|&s| (es[s], s));
        match next {
            Some(next) => {
                path.push(next);
                current = next;
            }
            None => break,
        }
    }
    path
}

// ============================================================================
// Resource conflict scan
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Machine,
    Operator,
}

/// One resource's booked interval in a schedule under inspection.
#[derive(Clone, Debug)]
pub struct ResourceInterval {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub task_id: TaskId,
    pub start: i64,
    pub end: i64,
}

/// An overlapping pair of intervals on one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceConflict {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub first_task: TaskId,
    pub second_task: TaskId,
    pub overlap_minutes: i64,
}

/// Sort each resource's intervals by start and flag consecutive overlaps.
pub fn detect_resource_conflicts(intervals: &[ResourceInterval]) -> Vec<ResourceConflict> {
    let mut by_resource: HashMap<(ResourceKind, Uuid), Vec<&ResourceInterval>> = HashMap::new();
    for interval in intervals {
        by_resource
            .entry((interval.kind, interval.resource_id))
            .or_default()
            .push(interval);
    }

    let mut conflicts = Vec::new();
    for ((kind, resource_id), mut list) in by_resource {
        list.sort_by_key(|i| (i.start, i.end));
        for pair in list.windows(2) {
            if pair[0].end > pair[1].start {
                conflicts.push(ResourceConflict {
                    kind,
                    resource_id,
                    first_task: pair[0].task_id,
                    second_task: pair[1].task_id,
                    overlap_minutes: pair[0].end - pair[1].start,
                });
            }
        }
    }
    conflicts.sort_by_key(|c| (c.resource_id, c.first_task, c.second_task));
    conflicts
}

/// The machine carrying the most critical minutes, if any.
pub fn bottleneck_machine(
    intervals: &[ResourceInterval],
    critical_tasks: &HashSet<TaskId>,
) -> Option<Uuid> {
    let mut load: HashMap<Uuid, i64> = HashMap::new();
    for interval in intervals {
        if interval.kind == ResourceKind::Machine && critical_tasks.contains(&interval.task_id) {
            *load.entry(interval.resource_id).or_default() += interval.end - interval.start;
        }
    }
    load.into_iter().max_by_key(|&(id, minutes)| (minutes, id)).map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tasks(durations: &[i64]) -> Vec<PathTask> {
        durations
            .iter()
            .map(|&d| PathTask { task_id: Uuid::new_v4(), duration_minutes: d })
            .collect()
    }

    #[test]
    fn single_task_is_critical() {
        let analyzer = CriticalPathAnalyzer::new();
        let analysis = analyzer.analyze(&tasks(&[60]), &[]).unwrap();
        assert_eq!(analysis.makespan, 60);
        assert_eq!(analysis.critical, vec![true]);
        assert_eq!(analysis.critical_path, vec![0]);
        assert_eq!(analysis.total_float, vec![0]);
    }

    #[test]
    fn sequential_chain_all_critical() {
        let analyzer = CriticalPathAnalyzer::new();
        let analysis = analyzer
            .analyze(&tasks(&[300, 180, 120]), &[(0, 1), (1, 2)])
            .unwrap();
        assert_eq!(analysis.makespan, 600);
        assert!(analysis.critical.iter().all(|&c| c));
        assert_eq!(analysis.earliest_start, vec![0, 300, 480]);
        assert_eq!(analysis.earliest_finish, vec![300, 480, 600]);
        assert_eq!(analysis.critical_path, vec![0, 1, 2]);
    }

    #[test]
    fn parallel_branch_has_float() {
        // a(300) -> c(120); b(180) -> c. Critical: a -> c.
        let analyzer = CriticalPathAnalyzer::new();
        let analysis = analyzer
            .analyze(&tasks(&[300, 180, 120]), &[(0, 2), (1, 2)])
            .unwrap();
        assert_eq!(analysis.makespan, 420);
        assert!(analysis.critical[0]);
        assert!(!analysis.critical[1]);
        assert!(analysis.critical[2]);
        assert_eq!(analysis.total_float[1], 120);
        assert_eq!(analysis.latest_start[1], 120);
        assert_eq!(analysis.critical_path, vec![0, 2]);
    }

    #[test]
    fn float_is_never_negative() {
        let analyzer = CriticalPathAnalyzer::new();
        let edges =
            vec![(0, 1), (0, 2), (1, 3), (2, 3), (3, 5), (0, 4), (4, 5)];
        let analysis = analyzer
            .analyze(&tasks(&[0, 300, 480, 360, 120, 0]), &edges)
            .unwrap();
        assert!(analysis.total_float.iter().all(|&f| f >= 0));
    }

    #[test]
    fn empty_graph_is_an_error() {
        let analyzer = CriticalPathAnalyzer::new();
        assert_eq!(analyzer.analyze(&[], &[]), Err(CpmError::EmptyGraph));
    }

    #[test]
    fn cycle_is_detected() {
        let analyzer = CriticalPathAnalyzer::new();
        let result = analyzer.analyze(&tasks(&[60, 60]), &[(0, 1), (1, 0)]);
        assert_eq!(result, Err(CpmError::CycleDetected { count: 2 }));
    }

    #[test]
    fn all_pass_algorithms_agree() {
        let analyzer = CriticalPathAnalyzer::new();
        let task_set = tasks(&[120, 45, 300, 60, 90, 15, 240, 30]);
        let edges = vec![(0, 1), (0, 2), (1, 3), (2, 3), (2, 4), (3, 5), (4, 6), (5, 7), (6, 7)];

        let direct = analyzer
            .analyze_with(&task_set, &edges, PassAlgorithm::Direct)
            .unwrap();
        // Distinct analyzers so the cache cannot mask differences.
        let parallel = CriticalPathAnalyzer::new()
            .analyze_with(&task_set, &edges, PassAlgorithm::LevelParallel)
            .unwrap();
        let in_place = CriticalPathAnalyzer::new()
            .analyze_with(&task_set, &edges, PassAlgorithm::InPlace)
            .unwrap();

        assert_eq!(direct.critical, parallel.critical);
        assert_eq!(direct.critical, in_place.critical);
        assert_eq!(direct.makespan, parallel.makespan);
        assert_eq!(direct.makespan, in_place.makespan);
        assert_eq!(direct.earliest_start, in_place.earliest_start);
        assert_eq!(direct.latest_finish, parallel.latest_finish);
        assert_eq!(direct.critical_path, in_place.critical_path);
    }

    #[test]
    fn cache_short_circuits_repeat_analysis() {
        let analyzer = CriticalPathAnalyzer::new();
        let task_set = tasks(&[60, 30]);
        let edges = vec![(0, 1)];
        let first = analyzer.analyze(&task_set, &edges).unwrap();
        let second = analyzer.analyze(&task_set, &edges).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(analyzer.cache_hits(), 1);
    }

    #[test]
    fn earliest_start_wins_among_multiple_chains() {
        // Two disjoint critical-length chains; the one containing index 0
        // starts the path.
        let analyzer = CriticalPathAnalyzer::new();
        let analysis = analyzer
            .analyze(&tasks(&[100, 100, 100, 100]), &[(0, 1), (2, 3)])
            .unwrap();
        assert_eq!(analysis.critical_path, vec![0, 1]);
    }

    #[test]
    fn conflict_scan_flags_overlaps() {
        let machine = Uuid::new_v4();
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let t3 = Uuid::new_v4();
        let intervals = vec![
            ResourceInterval { kind: ResourceKind::Machine, resource_id: machine, task_id: t1, start: 0, end: 60 },
            ResourceInterval { kind: ResourceKind::Machine, resource_id: machine, task_id: t2, start: 45, end: 90 },
            ResourceInterval { kind: ResourceKind::Machine, resource_id: machine, task_id: t3, start: 90, end: 120 },
        ];
        let conflicts = detect_resource_conflicts(&intervals);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].overlap_minutes, 15);
        assert_eq!(conflicts[0].first_task, t1);
        assert_eq!(conflicts[0].second_task, t2);
    }

    #[test]
    fn conflict_scan_ignores_touching_intervals() {
        let operator = Uuid::new_v4();
        let intervals = vec![
            ResourceInterval { kind: ResourceKind::Operator, resource_id: operator, task_id: Uuid::new_v4(), start: 0, end: 60 },
            ResourceInterval { kind: ResourceKind::Operator, resource_id: operator, task_id: Uuid::new_v4(), start: 60, end: 90 },
        ];
        assert!(detect_resource_conflicts(&intervals).is_empty());
    }

    #[test]
    fn bottleneck_is_the_most_loaded_critical_machine() {
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();
        let other = Uuid::new_v4();
        let intervals = vec![
            ResourceInterval { kind: ResourceKind::Machine, resource_id: m1, task_id: c1, start: 0, end: 300 },
            ResourceInterval { kind: ResourceKind::Machine, resource_id: m2, task_id: c2, start: 0, end: 60 },
            ResourceInterval { kind: ResourceKind::Machine, resource_id: m2, task_id: other, start: 60, end: 600 },
        ];
        let critical: HashSet<TaskId> = [c1, c2].into();
        assert_eq!(bottleneck_machine(&intervals, &critical), Some(m1));
    }
}
