//! Persistent component state and its flat-vector compaction.
//!
//! Component states are heterogeneous: a resistor has none, a capacitor
//! remembers its previous voltage and current, a composite component may nest
//! several sub-states. The steady-state and envelope-following analyses need
//! all of them as one real vector of solver unknowns, so [`compact`] flattens
//! a list of states and [`uncompact`] rebuilds the exact same shapes.

use nalgebra::DVector;

use crate::error::{Result, SimError};

/// Persistent state of one component.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Scalar(f64),
    List(Vec<State>),
}

impl Default for State {
    fn default() -> Self {
        Self::empty()
    }
}

impl State {
    /// State of a memoryless component.
    pub fn empty() -> Self {
        State::List(Vec::new())
    }

    /// Flat list of scalars.
    pub fn scalars(values: &[f64]) -> Self {
        State::List(values.iter().copied().map(State::Scalar).collect())
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            State::Scalar(value) => Some(*value),
            State::List(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&State> {
        match self {
            State::List(items) => items.get(index),
            State::Scalar(_) => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut State> {
        match self {
            State::List(items) => items.get_mut(index),
            State::Scalar(_) => None,
        }
    }

    /// Scalar stored at `index` of a list state.
    pub fn scalar_at(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(State::as_scalar)
    }

    /// Overwrite the scalar at `index` of a list state.
    ///
    /// Returns `false` if there is no scalar slot at `index`.
    pub fn set_scalar_at(&mut self, index: usize, value: f64) -> bool {
        match self.get_mut(index) {
            Some(State::Scalar(slot)) => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Number of scalars in this state, at any depth.
    pub fn len(&self) -> usize {
        match self {
            State::Scalar(_) => 1,
            State::List(items) => items.iter().map(State::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shape(&self) -> Shape {
        match self {
            State::Scalar(_) => Shape::Scalar,
            State::List(items) => Shape::List(items.iter().map(State::shape).collect()),
        }
    }

    fn flatten_into(&self, out: &mut Vec<f64>) {
        match self {
            State::Scalar(value) => out.push(*value),
            State::List(items) => items.iter().for_each(|item| item.flatten_into(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Scalar,
    List(Vec<Shape>),
}

impl Shape {
    fn rebuild(&self, values: &mut impl Iterator<Item = f64>) -> Option<State> {
        match self {
            Shape::Scalar => values.next().map(State::Scalar),
            Shape::List(items) => items
                .iter()
                .map(|item| item.rebuild(values))
                .collect::<Option<Vec<_>>>()
                .map(State::List),
        }
    }
}

/// Shapes of a list of states, as recorded by [`compact`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateLayout {
    shapes: Vec<Shape>,
    len: usize,
}

impl StateLayout {
    /// Number of scalars the layout spans.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of component states the layout describes.
    pub fn components(&self) -> usize {
        self.shapes.len()
    }
}

/// Flatten a list of component states into one vector.
pub fn compact(states: &[State]) -> (DVector<f64>, StateLayout) {
    let mut values = Vec::new();
    for state in states {
        state.flatten_into(&mut values);
    }
    let layout = StateLayout {
        shapes: states.iter().map(State::shape).collect(),
        len: values.len(),
    };
    (DVector::from_vec(values), layout)
}

/// Rebuild component states from a vector produced by [`compact`].
pub fn uncompact(values: &[f64], layout: &StateLayout) -> Result<Vec<State>> {
    if values.len() != layout.len {
        return Err(SimError::layout_mismatch(layout.len, values.len()));
    }

    let mut iter = values.iter().copied();
    layout
        .shapes
        .iter()
        .map(|shape| {
            shape
                .rebuild(&mut iter)
                .ok_or_else(|| SimError::layout_mismatch(layout.len, values.len()))
        })
        .collect()
}

/// Compact `states` and check they still fit `layout`.
pub(crate) fn compact_like(states: &[State], layout: &StateLayout) -> Result<DVector<f64>> {
    let (values, actual) = compact(states);
    if &actual != layout {
        return Err(SimError::StateShapeChanged);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Vec<State> {
        vec![
            State::empty(),
            State::scalars(&[1.5, -2.0]),
            State::Scalar(3.25),
            State::List(vec![
                State::Scalar(4.0),
                State::List(vec![]),
                State::List(vec![State::Scalar(5.0), State::scalars(&[6.0, 7.0])]),
            ]),
        ]
    }

    #[test]
    fn test_compact_flattens_in_order() {
        let (values, layout) = compact(&nested());
        assert_eq!(values.as_slice(), &[1.5, -2.0, 3.25, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(layout.len(), 7);
        assert_eq!(layout.components(), 4);
    }

    #[test]
    fn test_uncompact_restores_shapes() {
        let states = nested();
        let (values, layout) = compact(&states);
        assert_eq!(uncompact(values.as_slice(), &layout).unwrap(), states);
    }

    #[test]
    fn test_uncompact_with_new_values() {
        let (_, layout) = compact(&nested());
        let restored = uncompact(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &layout).unwrap();
        assert_eq!(restored[1], State::scalars(&[0.0, 1.0]));
        assert_eq!(restored[3].get(2).and_then(|s| s.get(1)), Some(&State::scalars(&[5.0, 6.0])));
    }

    #[test]
    fn test_uncompact_rejects_wrong_length() {
        let (_, layout) = compact(&nested());
        let err = uncompact(&[1.0, 2.0], &layout).unwrap_err();
        assert!(matches!(err, SimError::StateLayoutMismatch { expected: 7, actual: 2 }));
    }

    #[test]
    fn test_empty_states() {
        let (values, layout) = compact(&[State::empty(), State::empty()]);
        assert!(values.is_empty());
        assert_eq!(uncompact(&[], &layout).unwrap(), vec![State::empty(), State::empty()]);
    }

    #[test]
    fn test_scalar_accessors() {
        let mut state = State::scalars(&[1.0, 2.0]);
        assert_eq!(state.scalar_at(1), Some(2.0));
        assert!(state.set_scalar_at(0, 9.0));
        assert!(!state.set_scalar_at(5, 1.0));
        assert_eq!(state.scalar_at(0), Some(9.0));
        assert_eq!(State::Scalar(1.0).scalar_at(0), None);
    }

    #[test]
    fn test_compact_like_detects_shape_change() {
        let (_, layout) = compact(&[State::scalars(&[1.0])]);
        assert!(compact_like(&[State::scalars(&[2.0])], &layout).is_ok());
        assert!(matches!(
            compact_like(&[State::Scalar(2.0)], &layout),
            Err(SimError::StateShapeChanged)
        ));
    }
}
