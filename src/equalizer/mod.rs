//! Algorithm selection and parameter registry ("equalizer").
//!
//! Each [`Category`] has one active algorithm and a [`ParameterSet`] built
//! from the static schema of that algorithm. Selecting a different algorithm
//! discards the category's parameters and rebuilds them from scratch, so no
//! values leak between algorithms or categories.

mod category;
mod param;
mod profile;
mod schema;

pub use category::Category;
pub use param::{ParamValue, Parameter, ParameterSet};
pub use profile::PROFILE_HEADER;

use crate::util::{LocateError, LocateResult};
use schema::{default_parameters, is_force_fixed};

#[derive(Clone, Debug, PartialEq)]
struct Slot {
    active: usize,
    params: ParameterSet,
}

impl Slot {
    fn new(category: Category, active: usize) -> Self {
        let name = category.algorithms()[active];
        Self {
            active,
            params: default_parameters(category, name),
        }
    }
}

/// Active algorithms and their parameters for every category.
#[derive(Clone, Debug, PartialEq)]
pub struct Equalizer {
    slots: [Slot; 5],
}

impl Default for Equalizer {
    fn default() -> Self {
        Self {
            slots: Category::ALL.map(|category| Slot::new(category, 0)),
        }
    }
}

/// Saved copy of every category's selection and parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    slots: [Slot; 5],
}

impl Equalizer {
    /// Creates an equalizer with the default algorithm of every category.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, category: Category) -> &Slot {
        &self.slots[category as usize]
    }

    fn slot_mut(&mut self, category: Category) -> &mut Slot {
        &mut self.slots[category as usize]
    }

    /// Makes `algorithm` the active choice of `category`.
    ///
    /// The category's parameters are rebuilt from the algorithm's schema even
    /// when the same algorithm is selected again.
    pub fn select(&mut self, category: Category, algorithm: &str) -> LocateResult<()> {
        let index = category
            .index_of(algorithm)
            .ok_or_else(|| LocateError::UnknownAlgorithm {
                category,
                name: algorithm.to_owned(),
            })?;
        *self.slot_mut(category) = Slot::new(category, index);
        Ok(())
    }

    /// Returns the active algorithm name of `category`.
    pub fn active(&self, category: Category) -> &'static str {
        category.algorithms()[self.slot(category).active]
    }

    /// Returns the algorithms that `category` accepts.
    pub fn algorithms(&self, category: Category) -> &'static [&'static str] {
        category.algorithms()
    }

    /// Returns the parameters of the active algorithm of `category`.
    pub fn parameters(&self, category: Category) -> &ParameterSet {
        &self.slot(category).params
    }

    pub(crate) fn parameters_mut(&mut self, category: Category) -> &mut ParameterSet {
        &mut self.slot_mut(category).params
    }

    /// Looks up one parameter.
    pub fn get_parameter(&self, category: Category, name: &str) -> LocateResult<&Parameter> {
        self.parameters(category)
            .get(name)
            .ok_or_else(|| LocateError::UnknownParameter {
                category,
                name: name.to_owned(),
            })
    }

    /// Assigns a value to one parameter, enforcing its bounds and kind.
    pub fn set_parameter(
        &mut self,
        category: Category,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> LocateResult<()> {
        let param = self
            .parameters_mut(category)
            .get_mut(name)
            .ok_or_else(|| LocateError::UnknownParameter {
                category,
                name: name.to_owned(),
            })?;
        param
            .set_value(value)
            .map_err(|err| err.for_parameter(name))
    }

    /// Marks every parameter of `category` whose name matches as fixed.
    pub fn lock<P>(&mut self, category: Category, predicate: P)
    where
        P: Fn(&str) -> bool,
    {
        for (name, param) in self.parameters_mut(category).iter_mut() {
            if predicate(name.as_str()) {
                param.set_fixed(true);
            }
        }
    }

    /// Clears the fixed flag of matching parameters.
    ///
    /// Parameters on the force-fixed list (the extractor descriptor size)
    /// remain fixed.
    pub fn unlock<P>(&mut self, category: Category, predicate: P)
    where
        P: Fn(&str) -> bool,
    {
        for (name, param) in self.parameters_mut(category).iter_mut() {
            if predicate(name.as_str()) && !is_force_fixed(category, name) {
                param.set_fixed(false);
            }
        }
    }

    /// Returns an integer parameter value.
    pub fn int(&self, category: Category, name: &str) -> LocateResult<i64> {
        let value = self.get_parameter(category, name)?.value();
        value.as_i64().ok_or_else(|| mismatch(name, "int", &value))
    }

    /// Returns a numeric parameter value as a float.
    pub fn float(&self, category: Category, name: &str) -> LocateResult<f64> {
        match self.get_parameter(category, name)?.value() {
            ParamValue::Bool(_) => Err(mismatch(name, "float", &ParamValue::Bool(false))),
            other => Ok(other.as_f64()),
        }
    }

    /// Returns a boolean parameter value.
    pub fn flag(&self, category: Category, name: &str) -> LocateResult<bool> {
        let value = self.get_parameter(category, name)?.value();
        value.as_bool().ok_or_else(|| mismatch(name, "bool", &value))
    }

    /// Saves every selection and parameter.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            slots: self.slots.clone(),
        }
    }

    /// Restores a previously saved state.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.slots = snapshot.slots.clone();
    }

    /// Replaces a whole parameter (bounds and steps included) during profile
    /// loading; the kind must match the schema.
    fn replace_parameter(
        &mut self,
        category: Category,
        name: &str,
        param: Parameter,
    ) -> LocateResult<()> {
        let slot = self
            .parameters_mut(category)
            .get_mut(name)
            .ok_or_else(|| LocateError::UnknownParameter {
                category,
                name: name.to_owned(),
            })?;
        let param = match (slot.value(), param.value()) {
            (ParamValue::Float(_), ParamValue::Int(v)) => Parameter::from_parts(
                ParamValue::Float(v as f64),
                param.min(),
                param.max(),
                param.delta(),
                param.tolerance(),
                param.is_fixed(),
            )?,
            (current, new) if current.kind() != new.kind() => {
                return Err(mismatch(name, current.kind(), &new));
            }
            _ => param,
        };
        let fixed = param.is_fixed() || is_force_fixed(category, name);
        *slot = param.with_fixed(fixed);
        Ok(())
    }
}

fn mismatch(name: &str, expected: &'static str, got: &ParamValue) -> LocateError {
    LocateError::TypeMismatch {
        name: name.to_owned(),
        expected,
        got: got.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, Equalizer, ParamValue};
    use crate::util::LocateError;

    #[test]
    fn defaults_select_first_algorithm() {
        let eq = Equalizer::new();
        assert_eq!(eq.active(Category::Localization), "template");
        assert_eq!(eq.active(Category::FeatureMatcher), "BruteForce-Hamming");
        assert!(!eq.flag(Category::Localization, "ignore_color").unwrap());
    }

    #[test]
    fn reselecting_discards_changes() {
        let mut eq = Equalizer::new();
        eq.select(Category::FeatureDetector, "FAST").unwrap();
        eq.set_parameter(Category::FeatureDetector, "threshold", 40)
            .unwrap();
        eq.select(Category::FeatureDetector, "FAST").unwrap();
        assert_eq!(eq.int(Category::FeatureDetector, "threshold").unwrap(), 20);

        let err = eq.select(Category::FeatureDetector, "SURF").unwrap_err();
        assert!(matches!(err, LocateError::UnknownAlgorithm { .. }));
        assert_eq!(eq.active(Category::FeatureDetector), "FAST");
    }

    #[test]
    fn set_parameter_reports_name_and_kind() {
        let mut eq = Equalizer::new();
        eq.select(Category::Localization, "feature").unwrap();
        let err = eq
            .set_parameter(Category::Localization, "ransac_reproj_threshold", 500.0)
            .unwrap_err();
        assert_eq!(
            err,
            LocateError::OutOfRange {
                name: "ransac_reproj_threshold".into(),
                value: 500.0,
                min: Some(0.0),
                max: Some(200.0),
            }
        );
        assert!(matches!(
            eq.set_parameter(Category::Localization, "missing", 1),
            Err(LocateError::UnknownParameter { .. })
        ));
        assert!(matches!(
            eq.int(Category::Localization, "ransac_reproj_threshold"),
            Err(LocateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unlock_keeps_force_fixed_parameters() {
        let mut eq = Equalizer::new();
        eq.lock(Category::FeatureExtractor, |_| true);
        eq.unlock(Category::FeatureExtractor, |_| true);
        let params = eq.parameters(Category::FeatureExtractor);
        assert!(params.get("bytes").unwrap().is_fixed());
        assert!(!params.get("patchSize").unwrap().is_fixed());
    }

    #[test]
    fn snapshot_restores_values() {
        let mut eq = Equalizer::new();
        let saved = eq.snapshot();
        eq.select(Category::Localization, "hybrid").unwrap();
        eq.set_parameter(Category::Localization, "front_similarity", 0.5)
            .unwrap();
        eq.restore(&saved);
        assert_eq!(eq, Equalizer::new());
        assert_eq!(
            eq.get_parameter(Category::Localization, "ignore_color")
                .unwrap()
                .value(),
            ParamValue::Bool(false)
        );
    }
}
