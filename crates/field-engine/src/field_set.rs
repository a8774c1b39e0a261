//! Named collections of fields queried together by the advection kernel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use drift_common::{DomainBounds, TimeBounds};
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::config::FieldSetConfig;
use crate::error::{FieldError, Result};
use crate::field::Field;
use crate::grid::Grid;
use crate::types::{BoundaryPolicy, Gradient, WindowStats};

/// Role name under which the core velocity fields are validated.
pub const CORE_ROLE: &str = "core";

/// Builder for a [`FieldSet`]. All validation happens in [`build`](Self::build),
/// so a set that exists is always consistent.
#[derive(Default)]
pub struct FieldSetBuilder {
    config: FieldSetConfig,
    fields: Vec<Field>,
    raw: Vec<(String, Vec<f32>, Arc<Grid>)>,
    core: Option<Vec<String>>,
    roles: Vec<(String, Vec<String>)>,
    constants: Vec<(String, f64)>,
}

impl FieldSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: FieldSetConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a constructed field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a field from an in-memory `[t][k][j][i]` array, configured with
    /// the set's `field_defaults`.
    pub fn data_field(mut self, name: impl Into<String>, data: Vec<f32>, grid: Arc<Grid>) -> Self {
        self.raw.push((name.into(), data, grid));
        self
    }

    /// Declare the core fields used by default kernels. Without this call
    /// `U`, `V` (and `W` when present) are used if they exist.
    pub fn core_fields(mut self, names: &[&str]) -> Self {
        self.core = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Declare a vector role whose components must share a time scale.
    pub fn vector(mut self, role: impl Into<String>, components: &[&str]) -> Self {
        self.roles.push((
            role.into(),
            components.iter().map(|n| n.to_string()).collect(),
        ));
        self
    }

    /// Attach a named scalar, e.g. the width of a zonally periodic domain.
    pub fn constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.push((name.into(), value));
        self
    }

    /// Validate and assemble the set.
    pub fn build(self) -> Result<FieldSet> {
        self.config.validate().map_err(FieldError::InvalidConfig)?;

        let mut fields: BTreeMap<String, Field> = BTreeMap::new();
        let defaults = self.config.field_defaults.clone();
        let raw = self
            .raw
            .into_iter()
            .map(|(name, data, grid)| Field::from_data(name, data, grid, defaults.clone()));
        for field in self.fields.into_iter().map(Ok).chain(raw) {
            let mut field = field?;
            if fields.contains_key(field.name()) {
                return Err(FieldError::invalid_config(format!(
                    "duplicate field name '{}'",
                    field.name()
                )));
            }
            field.set_default_boundary(self.config.default_boundary)?;
            fields.insert(field.name().to_string(), field);
        }

        let core = match self.core {
            Some(core) => core,
            None => ["U", "V", "W"]
                .iter()
                .filter(|n| fields.contains_key(**n))
                .map(|n| n.to_string())
                .collect::<Vec<_>>(),
        };
        // U without V (or the reverse) is not a usable velocity
        let core = if core.len() == 1 && !core.iter().any(|n| n == "W") {
            Vec::new()
        } else {
            core
        };

        let mut roles: HashMap<String, Vec<String>> = HashMap::new();
        if !core.is_empty() {
            roles.insert(CORE_ROLE.to_string(), core.clone());
        }
        for (role, components) in self.roles {
            roles.insert(role, components);
        }
        for (role, components) in &roles {
            validate_role(&fields, role, components)?;
        }

        let set = FieldSet {
            fields,
            core,
            roles,
            constants: self.constants.into_iter().collect(),
            config: self.config,
        };
        info!(
            fields = ?set.field_names(),
            core = ?set.core,
            roles = set.roles.len(),
            "Field set ready"
        );
        Ok(set)
    }
}

/// All members of a role must exist, use compatible calendars, and have
/// overlapping time ranges (unless time-periodic).
fn validate_role(fields: &BTreeMap<String, Field>, role: &str, components: &[String]) -> Result<()> {
    let members = components
        .iter()
        .map(|name| {
            fields
                .get(name)
                .ok_or_else(|| FieldError::FieldNotFound(format!("{} (role {})", name, role)))
        })
        .collect::<Result<Vec<_>>>()?;

    for (n, a) in members.iter().enumerate() {
        for b in &members[n + 1..] {
            if !a.time_axis().is_compatible_with(b.time_axis()) {
                return Err(FieldError::inconsistent_axes(format!(
                    "role {}: {} uses calendar {} but {} uses {}; supply an explicit timestamp override",
                    role,
                    a.name(),
                    calendar_name(a),
                    b.name(),
                    calendar_name(b)
                )));
            }
            if !a.time_bounds().overlaps(&b.time_bounds()) {
                return Err(FieldError::inconsistent_axes(format!(
                    "role {}: {} covers [{}, {}] but {} covers [{}, {}]",
                    role,
                    a.name(),
                    a.data_time_bounds().start,
                    a.data_time_bounds().end,
                    b.name(),
                    b.data_time_bounds().start,
                    b.data_time_bounds().end
                )));
            }
        }
    }
    debug!(role = %role, members = ?components, "Validated role");
    Ok(())
}

fn calendar_name(field: &Field) -> String {
    field
        .time_axis()
        .calendar()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "explicit".to_string())
}

/// Fields keyed by name plus the roles and constants the kernel relies on.
#[derive(Debug)]
pub struct FieldSet {
    fields: BTreeMap<String, Field>,
    core: Vec<String>,
    roles: HashMap<String, Vec<String>>,
    constants: HashMap<String, f64>,
    config: FieldSetConfig,
}

impl FieldSet {
    pub fn builder() -> FieldSetBuilder {
        FieldSetBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| FieldError::FieldNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sample one field.
    pub async fn sample(&mut self, name: &str, x: f64, y: f64, z: f64, t: f64) -> Result<f64> {
        self.sample_with(name, x, y, z, t, None).await
    }

    /// Sample one field with an optional per-call boundary policy, which
    /// takes precedence over the field's own policy and the set default.
    pub async fn sample_with(
        &mut self,
        name: &str,
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<f64> {
        self.field_mut(name)?.sample_with(x, y, z, t, boundary).await
    }

    /// Spatial gradient of one field.
    pub async fn sample_gradient(&mut self, name: &str, x: f64, y: f64, z: f64, t: f64) -> Result<Gradient> {
        self.sample_gradient_with(name, x, y, z, t, None).await
    }

    pub async fn sample_gradient_with(
        &mut self,
        name: &str,
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<Gradient> {
        self.field_mut(name)?
            .sample_gradient_with(x, y, z, t, boundary)
            .await
    }

    /// Sample several fields at the same point, in the order given. Each
    /// field is interpolated on its own grid.
    pub async fn sample_vector(&mut self, names: &[&str], x: f64, y: f64, z: f64, t: f64) -> Result<Vec<f64>> {
        self.sample_vector_with(names, x, y, z, t, None).await
    }

    pub async fn sample_vector_with(
        &mut self,
        names: &[&str],
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<Vec<f64>> {
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            values.push(self.field_mut(name)?.sample_with(x, y, z, t, boundary).await?);
        }
        Ok(values)
    }

    /// Sample the components of a declared role.
    pub async fn sample_role(&mut self, role: &str, x: f64, y: f64, z: f64, t: f64) -> Result<Vec<f64>> {
        self.sample_role_with(role, x, y, z, t, None).await
    }

    pub async fn sample_role_with(
        &mut self,
        role: &str,
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<Vec<f64>> {
        let components = self
            .roles
            .get(role)
            .cloned()
            .ok_or_else(|| FieldError::FieldNotFound(format!("role {}", role)))?;
        let names: Vec<&str> = components.iter().map(String::as_str).collect();
        self.sample_vector_with(&names, x, y, z, t, boundary).await
    }

    /// Sample the core fields, e.g. `(U, V)` or `(U, V, W)`.
    pub async fn sample_core(&mut self, x: f64, y: f64, z: f64, t: f64) -> Result<Vec<f64>> {
        self.sample_role(CORE_ROLE, x, y, z, t).await
    }

    pub async fn sample_core_with(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        t: f64,
        boundary: Option<&BoundaryPolicy>,
    ) -> Result<Vec<f64>> {
        self.sample_role_with(CORE_ROLE, x, y, z, t, boundary).await
    }

    /// Load the window of every field for time `t`, concurrently.
    pub async fn advance_to(&mut self, t: f64) -> Result<()> {
        try_join_all(self.fields.values_mut().map(|field| field.advance_to(t))).await?;
        Ok(())
    }

    /// Region where every core field (or every field, without core
    /// fields) can be sampled.
    pub fn domain_bounds(&self) -> Option<DomainBounds> {
        let mut bounds = self.relevant().map(Field::domain_bounds);
        let first = bounds.next()?;
        bounds.try_fold(first, |acc, b| acc.intersection(&b))
    }

    /// Times at which every core field (or every field) can be sampled.
    pub fn time_bounds(&self) -> Option<TimeBounds> {
        let mut bounds = self.relevant().map(Field::time_bounds);
        let first = bounds.next()?;
        let joint = bounds.fold(first, |acc, b| TimeBounds {
            start: acc.start.max(b.start),
            end: acc.end.min(b.end),
        });
        (joint.start <= joint.end).then_some(joint)
    }

    fn relevant(&self) -> impl Iterator<Item = &Field> {
        let use_core = !self.core.is_empty();
        self.fields
            .values()
            .filter(move |f| !use_core || self.core.iter().any(|n| n == f.name()))
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: f64) {
        self.constants.insert(name.into(), value);
    }

    pub fn core_fields(&self) -> &[String] {
        &self.core
    }

    /// Components of a declared role.
    pub fn role(&self, role: &str) -> Option<&[String]> {
        self.roles.get(role).map(Vec::as_slice)
    }

    pub fn config(&self) -> &FieldSetConfig {
        &self.config
    }

    /// Window statistics per field.
    pub fn window_stats(&self) -> BTreeMap<String, WindowStats> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.window_stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use drift_common::TimeAxis;

    fn grid(times: &[f64]) -> Arc<Grid> {
        let axis = TimeAxis::from_seconds(times.to_vec()).unwrap();
        Arc::new(Grid::rectilinear(vec![0.0, 10.0], vec![0.0, 10.0], axis).unwrap())
    }

    fn uniform(value: f32, steps: usize) -> Vec<f32> {
        vec![value; 4 * steps]
    }

    #[tokio::test]
    async fn test_default_core_fields() {
        let g = grid(&[0.0, 10.0]);
        let mut set = FieldSet::builder()
            .data_field("U", uniform(1.0, 2), Arc::clone(&g))
            .data_field("V", uniform(2.0, 2), Arc::clone(&g))
            .data_field("T", uniform(3.0, 2), g)
            .build()
            .unwrap();

        assert_eq!(set.core_fields(), &["U".to_string(), "V".to_string()]);
        assert_eq!(set.sample_core(5.0, 5.0, 0.0, 5.0).await.unwrap(), vec![1.0, 2.0]);
        assert_eq!(set.sample("T", 5.0, 5.0, 0.0, 5.0).await.unwrap(), 3.0);
    }

    #[tokio::test]
    async fn test_per_call_boundary_override() {
        let g = grid(&[0.0, 10.0]);
        let mut set = FieldSet::builder()
            .data_field("U", uniform(1.0, 2), Arc::clone(&g))
            .data_field("V", uniform(2.0, 2), g)
            .vector("UV", &["U", "V"])
            .build()
            .unwrap();

        assert!(matches!(
            set.sample_core(5.0, 5.0, 0.0, 30.0).await,
            Err(FieldError::TimeOutOfRange { .. })
        ));

        let clamp = BoundaryPolicy::Clamp;
        assert_eq!(set.sample_core_with(5.0, 5.0, 0.0, 30.0, Some(&clamp)).await.unwrap(), vec![1.0, 2.0]);
        assert_eq!(set.sample_role_with("UV", 5.0, 5.0, 0.0, -5.0, Some(&clamp)).await.unwrap(), vec![1.0, 2.0]);
        assert_eq!(set.sample_with("V", 5.0, 5.0, 0.0, 30.0, Some(&clamp)).await.unwrap(), 2.0);

        let gradient = set
            .sample_gradient_with("U", 5.0, 5.0, 0.0, 30.0, Some(&clamp))
            .await
            .unwrap();
        assert_eq!((gradient.dx, gradient.dy), (0.0, 0.0));
        assert!(set.sample_gradient("U", 5.0, 5.0, 0.0, 30.0).await.is_err());

        // overrides are checked against each field's time axis
        let short = BoundaryPolicy::TimePeriodic { cycle: 3.0 };
        assert!(matches!(
            set.sample_vector_with(&["U", "V"], 5.0, 5.0, 0.0, 5.0, Some(&short)).await,
            Err(FieldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_duplicate_names() {
        let g = grid(&[0.0]);
        let result = FieldSet::builder()
            .data_field("U", uniform(1.0, 1), Arc::clone(&g))
            .data_field("U", uniform(1.0, 1), g)
            .build();
        assert!(matches!(result, Err(FieldError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_role_member() {
        let result = FieldSet::builder()
            .data_field("U", uniform(1.0, 1), grid(&[0.0]))
            .vector("UV", &["U", "V"])
            .build();
        assert!(matches!(result, Err(FieldError::FieldNotFound(_))));
    }

    #[test]
    fn test_disjoint_time_ranges() {
        let result = FieldSet::builder()
            .data_field("U", uniform(1.0, 2), grid(&[0.0, 10.0]))
            .data_field("V", uniform(1.0, 2), grid(&[20.0, 30.0]))
            .build();
        assert!(matches!(result, Err(FieldError::InconsistentFieldAxes(_))));
    }

    #[test]
    fn test_default_boundary_applies() {
        let config = FieldSetConfig {
            default_boundary: BoundaryPolicy::Clamp,
            field_defaults: FieldConfig::default(),
        };
        let set = FieldSet::builder()
            .config(config)
            .data_field("U", uniform(1.0, 2), grid(&[0.0, 10.0]))
            .build()
            .unwrap();
        assert_eq!(set.get("U").unwrap().boundary(), BoundaryPolicy::Clamp);
        assert!(set.time_bounds().unwrap().end.is_infinite());
    }

    #[tokio::test]
    async fn test_advance_to_primes_every_window() {
        let g = grid(&[0.0, 10.0, 20.0]);
        let mut set = FieldSet::builder()
            .data_field("U", uniform(1.0, 3), Arc::clone(&g))
            .data_field("V", uniform(1.0, 3), g)
            .build()
            .unwrap();
        set.advance_to(15.0).await.unwrap();
        for stats in set.window_stats().values() {
            assert_eq!(stats.loads, 2);
        }
        assert_eq!(set.get("V").unwrap().resident_snapshots(), vec![1, 2]);
    }

    #[test]
    fn test_constants() {
        let mut set = FieldSet::builder()
            .data_field("U", uniform(1.0, 1), grid(&[0.0]))
            .constant("zonal_width", 360.0)
            .build()
            .unwrap();
        assert_eq!(set.constant("zonal_width"), Some(360.0));
        set.add_constant("halo", 2.0);
        assert_eq!(set.constant("halo"), Some(2.0));
        assert_eq!(set.constant("missing"), None);
    }

    #[tokio::test]
    async fn test_unknown_field() {
        let mut set = FieldSet::builder()
            .data_field("U", uniform(1.0, 1), grid(&[0.0]))
            .build()
            .unwrap();
        let err = set.sample("V", 0.0, 0.0, 0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, FieldError::FieldNotFound(_)));
    }
}
