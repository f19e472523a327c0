//! Build steps.
//!
//! A model's top-level children are grouped into ordered buckets at their
//! step markers. Showing step `i` means: bucket `i` is what is being built
//! now, buckets before it are already built, buckets after it are not yet
//! built. Nested sub-models reveal as a whole with their top-level ancestor.

pub mod highlight;
pub mod layers;
pub mod presentation;
pub mod theme;

pub use highlight::{apply_highlight, bricks, clear_highlight, BrickHighlight};
pub use layers::{layer_steps, LayeredSteps, LAYER_EPSILON};
pub use presentation::{apply, plan, GhostStyle, MaterialPlan, NodeState, PlannedPrimitive};
pub use theme::{apply_theme, revert_theme, ColorTheme, ThemeCatalog};

use crate::scene::{NodeId, Scene};

/// The top-level nodes revealed together in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepBucket {
    pub index: usize,
    pub nodes: Vec<NodeId>,
}

/// Ordered buckets; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    buckets: Vec<StepBucket>,
}

/// The root children split around one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepPartition {
    /// The step index after clamping.
    pub index: usize,
    pub current: Vec<NodeId>,
    pub built: Vec<NodeId>,
    pub not_yet_built: Vec<NodeId>,
}

/// Group the root's direct children into step buckets.
///
/// A child with a step marker starts a new bucket, unless the current one is
/// still empty. Bucket 0 always exists.
pub fn group_steps(scene: &Scene) -> StepPlan {
    let mut buckets = vec![StepBucket {
        index: 0,
        nodes: Vec::new(),
    }];

    for &child in scene.children(scene.root()) {
        let starts_step = scene.node(child).step_marker;
        let needs_new = buckets.last().is_some_and(|b| !b.nodes.is_empty());
        if starts_step && needs_new {
            buckets.push(StepBucket {
                index: buckets.len(),
                nodes: Vec::new(),
            });
        }
        if let Some(bucket) = buckets.last_mut() {
            bucket.nodes.push(child);
        }
    }

    StepPlan { buckets }
}

impl StepPlan {
    pub fn step_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn buckets(&self) -> &[StepBucket] {
        &self.buckets
    }

    pub fn bucket(&self, index: usize) -> Option<&StepBucket> {
        self.buckets.get(index)
    }

    /// Clamp a requested step into range.
    pub fn clamp(&self, index: usize) -> usize {
        index.min(self.buckets.len().saturating_sub(1))
    }

    /// Split the root children around step `index` (clamped).
    pub fn partition(&self, index: usize) -> StepPartition {
        let index = self.clamp(index);
        let mut partition = StepPartition {
            index,
            ..StepPartition::default()
        };
        for bucket in &self.buckets {
            let target = match bucket.index.cmp(&index) {
                std::cmp::Ordering::Less => &mut partition.built,
                std::cmp::Ordering::Equal => &mut partition.current,
                std::cmp::Ordering::Greater => &mut partition.not_yet_built,
            };
            target.extend(bucket.nodes.iter().copied());
        }
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::testing::{fixture, THREE_STEPS};

    #[tokio::test]
    async fn test_three_children_three_buckets() {
        let fx = fixture();
        let scene = fx.load_text(THREE_STEPS).await;
        let plan = group_steps(&scene);

        assert_eq!(plan.step_count(), 3);
        assert!(plan.buckets().iter().all(|b| b.nodes.len() == 1));
        let order: Vec<usize> = plan.buckets().iter().map(|b| b.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_partition_is_exact() {
        let fx = fixture();
        let scene = fx.load_text(THREE_STEPS).await;
        let plan = group_steps(&scene);
        let children = scene.children(scene.root()).to_vec();

        let nodes: Vec<NodeId> = plan.buckets().iter().flat_map(|b| b.nodes.iter().copied()).collect();
        assert_eq!(nodes, children);

        for i in 0..plan.step_count() {
            let p = plan.partition(i);
            assert_eq!(p.built, children[..i].to_vec());
            assert_eq!(p.current, vec![children[i]]);
            assert_eq!(p.not_yet_built, children[i + 1..].to_vec());

            let mut all: Vec<NodeId> = Vec::new();
            all.extend(&p.built);
            all.extend(&p.current);
            all.extend(&p.not_yet_built);
            assert_eq!(all, children);
        }
    }

    #[tokio::test]
    async fn test_buckets_keep_source_order() {
        let fx = fixture();
        let scene = fx
            .load_text(
                "1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                 1 1 0 -24 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                 0 STEP\n\
                 1 7 0 -48 0 1 0 0 0 1 0 0 0 1 3003.dat\n\
                 1 14 0 -72 0 1 0 0 0 1 0 0 0 1 3001.dat\n",
            )
            .await;
        let plan = group_steps(&scene);
        let children = scene.children(scene.root());
        let buckets: Vec<Vec<NodeId>> = plan.buckets().iter().map(|b| b.nodes.clone()).collect();
        assert_eq!(
            buckets,
            vec![children[..2].to_vec(), children[2..].to_vec()]
        );
        let colours: Vec<u32> = buckets[1].iter().map(|&id| scene.node(id).color_id).collect();
        assert_eq!(colours, vec![7, 14]);
    }

    #[tokio::test]
    async fn test_partition_clamps() {
        let fx = fixture();
        let scene = fx.load_text(THREE_STEPS).await;
        let plan = group_steps(&scene);
        let last = plan.partition(99);
        assert_eq!(last.index, 2);
        assert!(last.not_yet_built.is_empty());
        assert_eq!(last.built.len(), 2);
    }

    #[tokio::test]
    async fn test_marker_on_first_child_does_not_open_empty_bucket() {
        let fx = fixture();
        let scene = fx
            .load_text(
                "0 STEP\n\
                 1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                 1 4 0 -24 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                 0 STEP\n\
                 0 STEP\n\
                 1 4 0 -48 0 1 0 0 0 1 0 0 0 1 3003.dat\n",
            )
            .await;
        let plan = group_steps(&scene);
        let sizes: Vec<usize> = plan.buckets().iter().map(|b| b.nodes.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_empty_model_has_one_empty_bucket() {
        let fx = fixture();
        let scene = fx.load_text("0 Nothing here\n0 STEP\n").await;
        let plan = group_steps(&scene);
        assert_eq!(plan.step_count(), 1);
        let p = plan.partition(0);
        assert!(p.current.is_empty() && p.built.is_empty() && p.not_yet_built.is_empty());
    }
}
