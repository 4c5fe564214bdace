// Sparse user x post interaction matrix

use std::collections::{BTreeMap, BTreeSet};

use crate::config::InteractionWeighting;
use crate::core::{PostId, UserId};
use crate::models::{Interaction, InteractionKind};

/// Sparse implicit-feedback matrix. Rows are users, columns are posts that
/// at least one user engaged with.
///
/// Ordered maps keep every traversal (and therefore every floating point
/// summation) in a fixed order for a given set of interactions.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    rows: BTreeMap<UserId, BTreeMap<PostId, f64>>,
    columns: BTreeMap<PostId, BTreeSet<UserId>>,
    weighting: InteractionWeighting,
}

impl InteractionMatrix {
    pub fn new(weighting: InteractionWeighting) -> Self {
        Self {
            rows: BTreeMap::new(),
            columns: BTreeMap::new(),
            weighting,
        }
    }

    pub fn build(interactions: &[Interaction], weighting: InteractionWeighting) -> Self {
        let mut matrix = Self::new(weighting);
        for interaction in interactions {
            matrix.add(interaction);
        }
        matrix
    }

    /// Folds one interaction into its cell.
    pub fn add(&mut self, interaction: &Interaction) {
        let weight = match self.weighting {
            InteractionWeighting::Binary => None,
            InteractionWeighting::Weighted { like, comment, share } => Some(match interaction.kind {
                InteractionKind::Like => like,
                InteractionKind::Comment => comment,
                InteractionKind::Share => share,
            }),
        };

        let cell = self
            .rows
            .entry(interaction.user_id)
            .or_default()
            .entry(interaction.post_id)
            .or_insert(0.0);
        *cell = match weight {
            None => 1.0,
            Some(w) => *cell + w.max(0.0),
        };

        self.columns
            .entry(interaction.post_id)
            .or_default()
            .insert(interaction.user_id);
    }

    pub fn row(&self, user_id: UserId) -> Option<&BTreeMap<PostId, f64>> {
        self.rows.get(&user_id)
    }

    pub fn value(&self, user_id: UserId, post_id: PostId) -> f64 {
        self.rows
            .get(&user_id)
            .and_then(|row| row.get(&post_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Users who engaged with the post.
    pub fn engaged_users(&self, post_id: PostId) -> impl Iterator<Item = UserId> + '_ {
        self.columns
            .get(&post_id)
            .into_iter()
            .flat_map(|users| users.iter().copied())
    }

    pub fn has_interactions(&self, user_id: UserId) -> bool {
        self.rows.get(&user_id).is_some_and(|row| !row.is_empty())
    }

    pub fn interacted_posts(&self, user_id: UserId) -> Vec<PostId> {
        self.rows
            .get(&user_id)
            .map(|row| row.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.rows.len()
    }

    pub fn post_count(&self) -> usize {
        self.columns.len()
    }
}

/// Dot product of two sparse rows and the number of shared posts.
///
/// Only shared keys contribute and they are visited in ascending post id
/// order whichever row drives the loop, so `dot(a, b) == dot(b, a)` exactly.
pub fn dot(a: &BTreeMap<PostId, f64>, b: &BTreeMap<PostId, f64>) -> (f64, usize) {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut sum = 0.0;
    let mut overlap = 0;
    for (post_id, value) in small {
        if let Some(other) = large.get(post_id) {
            sum += value * other;
            overlap += 1;
        }
    }
    (sum, overlap)
}

pub fn norm(row: &BTreeMap<PostId, f64>) -> f64 {
    row.values().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn interaction(user: i64, post: i64, kind: InteractionKind) -> Interaction {
        Interaction {
            user_id: UserId::new(user),
            post_id: PostId::new(post),
            kind,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_binary_cells_ignore_kind_and_repeats() {
        let matrix = InteractionMatrix::build(
            &[
                interaction(1, 10, InteractionKind::Like),
                interaction(1, 10, InteractionKind::Comment),
                interaction(1, 10, InteractionKind::Comment),
                interaction(2, 11, InteractionKind::Share),
            ],
            InteractionWeighting::Binary,
        );

        assert_eq!(matrix.value(UserId::new(1), PostId::new(10)), 1.0);
        assert_eq!(matrix.value(UserId::new(2), PostId::new(11)), 1.0);
        assert_eq!(matrix.value(UserId::new(2), PostId::new(10)), 0.0);
        assert_eq!(matrix.user_count(), 2);
        assert_eq!(matrix.post_count(), 2);
    }

    #[test]
    fn test_weighted_cells_sum_kind_weights() {
        let matrix = InteractionMatrix::build(
            &[
                interaction(1, 10, InteractionKind::Like),
                interaction(1, 10, InteractionKind::Share),
            ],
            InteractionWeighting::weighted_default(),
        );
        assert_eq!(matrix.value(UserId::new(1), PostId::new(10)), 4.0);
    }

    #[test]
    fn test_dot_counts_overlap() {
        let matrix = InteractionMatrix::build(
            &[
                interaction(1, 10, InteractionKind::Like),
                interaction(1, 11, InteractionKind::Like),
                interaction(1, 12, InteractionKind::Like),
                interaction(2, 11, InteractionKind::Like),
                interaction(2, 12, InteractionKind::Like),
                interaction(2, 13, InteractionKind::Like),
            ],
            InteractionWeighting::Binary,
        );
        let a = matrix.row(UserId::new(1)).unwrap();
        let b = matrix.row(UserId::new(2)).unwrap();
        assert_eq!(dot(a, b), (2.0, 2));
        assert!((norm(a) - 3f64.sqrt()).abs() < 1e-12);

        let engaged: Vec<UserId> = matrix.engaged_users(PostId::new(11)).collect();
        assert_eq!(engaged, vec![UserId::new(1), UserId::new(2)]);
    }
}
