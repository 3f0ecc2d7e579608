use indexmap::IndexMap;
use pipedag_core::{StepId, StepMap, Vec2};
use std::collections::{HashMap, VecDeque};

pub trait Layouter {
    fn execute(&self, steps: &StepMap) -> IndexMap<StepId, Vec2>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub step_size: Vec2,
    /// Gap between neighbouring steps as a fraction of the step size.
    pub spacing_factor: f64,
    pub margin_left: f64,
    /// Usually larger than `margin_left` so steps clear toolbar chrome.
    pub margin_top: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            step_size: Vec2::new(190.0, 105.0),
            spacing_factor: 0.7,
            margin_left: 20.0,
            margin_top: 80.0,
        }
    }
}

/// Layered left-to-right layout for pipeline DAGs.
///
/// Each step's layer is its longest-path distance from a root. Layers are
/// ordered with barycenter sweeps and centered on the tallest layer. Steps a
/// topological sweep cannot reach (cycles and everything below them) go to an
/// overflow lane under the grid.
pub struct AutoLayouter {
    pub config: LayoutConfig,
}

#[derive(Default)]
struct Relations {
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
}

impl AutoLayouter {
    const BARYCENTER_PASSES: usize = 2;

    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// Writes new positions into `steps`. Returns how many steps moved.
    pub fn apply(&self, steps: &mut StepMap) -> usize {
        let positions = self.execute(steps);
        let mut moved = 0;
        for (id, position) in positions {
            if let Some(step) = steps.get_mut(&id)
                && step.meta_data.position != position
            {
                step.meta_data.position = position;
                moved += 1;
            }
        }
        moved
    }

    fn build_relations(steps: &StepMap) -> Relations {
        let n = steps.len();
        let mut relations = Relations {
            parents: vec![Vec::new(); n],
            children: vec![Vec::new(); n],
        };

        for (child_idx, step) in steps.values().enumerate() {
            for parent_id in &step.incoming_connections {
                let Some(parent_idx) = steps.get_index_of(parent_id) else {
                    continue;
                };
                if parent_idx == child_idx || relations.parents[child_idx].contains(&parent_idx) {
                    continue;
                }
                relations.parents[child_idx].push(parent_idx);
                relations.children[parent_idx].push(child_idx);
            }
        }

        for children in &mut relations.children {
            children.sort_unstable();
        }

        relations
    }

    /// Longest-path layering via Kahn's algorithm. `None` marks unreachable steps.
    fn assign_layers(relations: &Relations) -> Vec<Option<usize>> {
        let n = relations.parents.len();
        let mut indegree: Vec<usize> = relations.parents.iter().map(Vec::len).collect();
        let mut ranks: Vec<Option<usize>> = vec![None; n];
        let mut queue: VecDeque<usize> = VecDeque::new();

        for (idx, degree) in indegree.iter().enumerate() {
            if *degree == 0 {
                ranks[idx] = Some(0);
                queue.push_back(idx);
            }
        }

        while let Some(idx) = queue.pop_front() {
            let rank = ranks[idx].unwrap_or(0);
            for &child in &relations.children[idx] {
                let child_rank = ranks[child].map_or(rank + 1, |r| r.max(rank + 1));
                ranks[child] = Some(child_rank);
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        // Children of a cycle may have been given a provisional rank before
        // their indegree reached zero; they are unreachable as well.
        for (idx, degree) in indegree.iter().enumerate() {
            if *degree > 0 {
                ranks[idx] = None;
            }
        }

        ranks
    }

    fn build_layers(ranks: &[Option<usize>]) -> (Vec<Vec<usize>>, Vec<usize>) {
        let depth = ranks.iter().flatten().max().map_or(0, |max| max + 1);
        let mut layers = vec![Vec::new(); depth];
        let mut overflow = Vec::new();
        for (idx, rank) in ranks.iter().enumerate() {
            match rank {
                Some(rank) => layers[*rank].push(idx),
                None => overflow.push(idx),
            }
        }
        (layers, overflow)
    }

    fn layer_coords(layers: &[Vec<usize>]) -> HashMap<usize, f64> {
        let mut coords = HashMap::new();
        for layer in layers {
            for (pos, &idx) in layer.iter().enumerate() {
                coords.insert(idx, pos as f64);
            }
        }
        coords
    }

    fn order_layer_by_barycenter(
        layer: &mut [usize],
        neighbors: &[Vec<usize>],
        coords: &HashMap<usize, f64>,
    ) {
        let mut keyed: Vec<(f64, f64, usize)> = layer
            .iter()
            .map(|&idx| {
                let current = coords.get(&idx).copied().unwrap_or(0.0);
                let placed: Vec<f64> = neighbors[idx]
                    .iter()
                    .filter_map(|n| coords.get(n).copied())
                    .collect();
                let barycenter = if placed.is_empty() {
                    current
                } else {
                    placed.iter().sum::<f64>() / placed.len() as f64
                };
                (barycenter, current, idx)
            })
            .collect();

        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        for (slot, (_, _, idx)) in layer.iter_mut().zip(keyed) {
            *slot = idx;
        }
    }

    fn run_barycenter_passes(layers: &mut [Vec<usize>], relations: &Relations) {
        for _ in 0..Self::BARYCENTER_PASSES {
            for rank in 1..layers.len() {
                let coords = Self::layer_coords(layers);
                Self::order_layer_by_barycenter(&mut layers[rank], &relations.parents, &coords);
            }
            for rank in (0..layers.len().saturating_sub(1)).rev() {
                let coords = Self::layer_coords(layers);
                Self::order_layer_by_barycenter(&mut layers[rank], &relations.children, &coords);
            }
        }
    }

    fn pitch(&self) -> Vec2 {
        self.config.step_size * (1.0 + self.config.spacing_factor.max(0.0))
    }
}

impl Layouter for AutoLayouter {
    fn execute(&self, steps: &StepMap) -> IndexMap<StepId, Vec2> {
        let relations = Self::build_relations(steps);
        let ranks = Self::assign_layers(&relations);
        let (mut layers, overflow) = Self::build_layers(&ranks);
        Self::run_barycenter_passes(&mut layers, &relations);

        let pitch = self.pitch();
        let tallest = layers.iter().map(Vec::len).max().unwrap_or(0);
        let mut by_index: HashMap<usize, Vec2> = HashMap::with_capacity(steps.len());

        for (rank, layer) in layers.iter().enumerate() {
            let top = self.config.margin_top + (tallest - layer.len()) as f64 * pitch.y / 2.0;
            for (slot, &idx) in layer.iter().enumerate() {
                by_index.insert(
                    idx,
                    Vec2::new(
                        self.config.margin_left + rank as f64 * pitch.x,
                        top + slot as f64 * pitch.y,
                    ),
                );
            }
        }

        if !overflow.is_empty() {
            tracing::warn!(
                count = overflow.len(),
                "Steps unreachable from any root (cycle); placing them in the overflow lane"
            );
            let lane_y = self.config.margin_top + tallest as f64 * pitch.y;
            for (slot, &idx) in overflow.iter().enumerate() {
                by_index.insert(
                    idx,
                    Vec2::new(self.config.margin_left + slot as f64 * pitch.x, lane_y),
                );
            }
        }

        steps
            .keys()
            .enumerate()
            .filter_map(|(idx, id)| by_index.get(&idx).map(|pos| (*id, *pos)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipedag_core::Step;

    fn id(raw: u128) -> StepId {
        StepId::from_u128(raw)
    }

    fn graph(edges: &[(u128, u128)], count: u128) -> StepMap {
        let mut steps = StepMap::new();
        for raw in 1..=count {
            steps.insert(id(raw), Step::new(id(raw), format!("s{raw}")));
        }
        for (from, to) in edges {
            if let Some(step) = steps.get_mut(&id(*to)) {
                step.add_incoming(id(*from));
            }
        }
        steps
    }

    #[test]
    fn test_layers_follow_longest_path() {
        // 1 -> 2 -> 3 and 1 -> 3: step 3 sits two layers right of step 1.
        let steps = graph(&[(1, 2), (2, 3), (1, 3)], 3);
        let layouter = AutoLayouter::new(LayoutConfig::default());
        let positions = layouter.execute(&steps);
        let pitch_x = 190.0 * 1.7;

        assert_eq!(positions[&id(1)].x, 20.0);
        assert!((positions[&id(2)].x - (20.0 + pitch_x)).abs() < 1e-9);
        assert!((positions[&id(3)].x - (20.0 + 2.0 * pitch_x)).abs() < 1e-9);
        assert_eq!(positions[&id(1)].y, 80.0);
    }

    #[test]
    fn test_isolated_steps_share_first_layer() {
        let steps = graph(&[], 3);
        let positions = AutoLayouter::new(LayoutConfig::default()).execute(&steps);
        let xs: Vec<f64> = positions.values().map(|p| p.x).collect();
        assert_eq!(xs, vec![20.0, 20.0, 20.0]);

        let ys: Vec<f64> = positions.values().map(|p| p.y).collect();
        assert!(ys[0] < ys[1] && ys[1] < ys[2]);
    }

    #[test]
    fn test_cycle_members_go_to_overflow_lane() {
        // 1 is a root; 2 <-> 3 form a cycle; 4 hangs below the cycle.
        let steps = graph(&[(1, 2), (3, 2), (2, 3), (3, 4)], 4);
        let positions = AutoLayouter::new(LayoutConfig::default()).execute(&steps);
        let grid_bottom = 80.0 + 105.0;

        for raw in [2, 3, 4] {
            assert!(positions[&id(raw)].y >= grid_bottom, "step {raw} overlaps grid");
        }
        assert_eq!(positions[&id(1)], Vec2::new(20.0, 80.0));
        assert_eq!(positions.len(), 4);
    }

    #[test]
    fn test_layers_are_vertically_centered() {
        // 1 feeds 2, 3 and 4; the single root is centered against the tall layer.
        let steps = graph(&[(1, 2), (1, 3), (1, 4)], 4);
        let positions = AutoLayouter::new(LayoutConfig::default()).execute(&steps);
        let pitch_y = 105.0 * 1.7;
        assert!((positions[&id(1)].y - (80.0 + pitch_y)).abs() < 1e-9);
        assert!((positions[&id(3)].y - (80.0 + pitch_y)).abs() < 1e-9);
    }

    #[test]
    fn test_apply_reports_moved_steps() {
        let mut steps = graph(&[(1, 2)], 2);
        let layouter = AutoLayouter::new(LayoutConfig::default());
        assert_eq!(layouter.apply(&mut steps), 2);
        assert_eq!(layouter.apply(&mut steps), 0);
    }
}
