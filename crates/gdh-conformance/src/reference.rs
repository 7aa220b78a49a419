#![forbid(unsafe_code)]

//! Reference collaborators: a grid builder, an analytic default state and two
//! small components that exercise every capability the harness dispatches on.

use crate::scenarios::StateFactory;
use gdh_runtime::{Capability, Component, ComponentError, InvocationContext};
use gdh_state::{
    GridSpec, LabeledArray, OutputBundle, PhysicalState, StateError, TIME_KEY, Timestamp,
    element_count, is_vertical_dim,
};
use std::time::Duration;

pub const LON_DIM: &str = "lon";
pub const LAT_DIM: &str = "lat";
pub const MID_LEVELS: &str = "mid_levels";
pub const INTERFACE_LEVELS: &str = "interface_levels";

pub const REFERENCE_TIME: &str = "2020-01-01T00:00:00";
pub const REFERENCE_PRESSURE: f64 = 1.0e5;
const KAPPA: f64 = 2.0 / 7.0;
const RELAXATION_SECONDS: f64 = 40.0 * 86_400.0;
const FRICTION_RATE: f64 = 1.0 / 86_400.0;
const FRICTION_SIGMA: f64 = 0.7;
const HUMIDITY_DIFFUSIVITY: f64 = 1.0e-5;
const PERTURBATION_AMPLITUDE: f64 = 1.0e-3;

/// Canonical axis order every reference component works in.
const CANONICAL_ORDER: [&str; 4] = [LON_DIM, LAT_DIM, MID_LEVELS, INTERFACE_LEVELS];

#[derive(Debug, Clone, Copy, Default)]
struct Point {
    lon: usize,
    lat: usize,
    level: usize,
}

fn horizontal_dims(grid: GridSpec) -> Vec<(&'static str, usize)> {
    let mut dims = Vec::with_capacity(2);
    if let Some(nx) = grid.nx {
        dims.push((LON_DIM, nx));
    }
    if let Some(ny) = grid.ny {
        dims.push((LAT_DIM, ny));
    }
    dims
}

fn with_vertical(grid: GridSpec, vertical: (&'static str, usize)) -> Vec<(&'static str, usize)> {
    let mut dims = horizontal_dims(grid);
    dims.push(vertical);
    dims
}

/// Evaluates `value` at every grid point of `dims` in row-major order.
fn field(
    dims: &[(&'static str, usize)],
    value: impl Fn(Point) -> f64,
) -> Result<LabeledArray, StateError> {
    let names: Vec<&str> = dims.iter().map(|(name, _)| *name).collect();
    let shape: Vec<usize> = dims.iter().map(|(_, extent)| *extent).collect();
    let count = element_count(&shape)?;

    let mut values = Vec::with_capacity(count);
    let mut index = vec![0usize; dims.len()];
    for _ in 0..count {
        let mut point = Point::default();
        for (&name, &i) in names.iter().zip(&index) {
            match name {
                LON_DIM => point.lon = i,
                LAT_DIM => point.lat = i,
                _ => point.level = i,
            }
        }
        values.push(value(point));

        for axis in (0..index.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    LabeledArray::from_f64(&names, &shape, values)
}

fn latitude_deg(grid: GridSpec, j: usize) -> f64 {
    grid.ny
        .map_or(0.0, |ny| -90.0 + (j as f64 + 0.5) * 180.0 / ny as f64)
}

fn longitude_deg(grid: GridSpec, i: usize) -> f64 {
    grid.nx.map_or(0.0, |nx| i as f64 * 360.0 / nx as f64)
}

/// Sigma on interfaces runs from 1 at the surface to 0 at the model top.
fn interface_sigma(nz: usize, k: usize) -> f64 {
    1.0 - k as f64 / nz as f64
}

fn mid_sigma(nz: usize, k: usize) -> f64 {
    0.5 * (interface_sigma(nz, k) + interface_sigma(nz, k + 1))
}

fn surface_pressure(grid: GridSpec, p: Point) -> f64 {
    let lat = latitude_deg(grid, p.lat).to_radians();
    let lon = longitude_deg(grid, p.lon).to_radians();
    REFERENCE_PRESSURE - 1.5e3 * lat.sin().powi(2) + 2.0e2 * (2.0 * lon).cos()
}

fn equilibrium_temperature(pressure: f64) -> f64 {
    (315.0 * (pressure / REFERENCE_PRESSURE).powf(KAPPA)).max(200.0)
}

/// Coordinates and pressure levels for `grid`.
pub fn get_grid(grid: GridSpec) -> Result<PhysicalState, StateError> {
    let horizontal = horizontal_dims(grid);
    let nz = grid.nz;
    let mut state = PhysicalState::new();

    state.insert(
        "latitude",
        field(&horizontal, |p| latitude_deg(grid, p.lat))?.with_attr("units", "degrees_north"),
    );
    state.insert(
        "longitude",
        field(&horizontal, |p| longitude_deg(grid, p.lon))?.with_attr("units", "degrees_east"),
    );
    state.insert(
        "surface_air_pressure",
        field(&horizontal, |p| surface_pressure(grid, p))?.with_attr("units", "Pa"),
    );
    state.insert(
        "air_pressure",
        field(&with_vertical(grid, (MID_LEVELS, nz)), |p| {
            mid_sigma(nz, p.level) * surface_pressure(grid, p)
        })?
        .with_attr("units", "Pa"),
    );
    state.insert(
        "air_pressure_on_interface_levels",
        field(&with_vertical(grid, (INTERFACE_LEVELS, nz + 1)), |p| {
            interface_sigma(nz, p.level) * surface_pressure(grid, p)
        })?
        .with_attr("units", "Pa"),
    );
    Ok(state)
}

/// Analytic, fully deterministic initial conditions on any grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceStateFactory;

impl StateFactory for ReferenceStateFactory {
    fn default_state(
        &self,
        _component: &dyn Component,
        grid: GridSpec,
    ) -> Result<PhysicalState, StateError> {
        let nz = grid.nz;
        let mid = with_vertical(grid, (MID_LEVELS, nz));
        let mut state = get_grid(grid)?;

        state.insert(TIME_KEY, Timestamp::parse(REFERENCE_TIME)?);
        state.insert(
            "air_temperature",
            field(&mid, |p| {
                let lat = latitude_deg(grid, p.lat).to_radians();
                (288.0 - 30.0 * lat.sin().powi(2)) * mid_sigma(nz, p.level).powf(0.19)
            })?
            .with_attr("units", "degK"),
        );
        state.insert(
            "eastward_wind",
            field(&mid, |p| {
                let lat = latitude_deg(grid, p.lat).to_radians();
                25.0 * lat.cos() * (1.0 - mid_sigma(nz, p.level))
            })?
            .with_attr("units", "m s^-1"),
        );
        state.insert(
            "northward_wind",
            field(&mid, |p| {
                let lon = longitude_deg(grid, p.lon).to_radians();
                0.5 * (2.0 * lon).sin() * mid_sigma(nz, p.level)
            })?
            .with_attr("units", "m s^-1"),
        );
        state.insert(
            "specific_humidity",
            field(&mid, |p| {
                let lat = latitude_deg(grid, p.lat).to_radians();
                let lon = longitude_deg(grid, p.lon).to_radians();
                0.015 * mid_sigma(nz, p.level).powi(3) * lat.cos().powi(2)
                    * (1.0 + 0.1 * lon.cos())
            })?
            .with_attr("units", "kg/kg"),
        );
        Ok(state)
    }
}

fn required<'s>(state: &'s PhysicalState, name: &str) -> Result<&'s LabeledArray, ComponentError> {
    state
        .array(name)
        .ok_or_else(|| ComponentError::MissingInput(name.to_string()))
}

/// Reorders `array` to lon, lat, then vertical.
fn canonical(name: &str, array: &LabeledArray) -> Result<LabeledArray, ComponentError> {
    if let Some(dim) = array
        .dims()
        .iter()
        .find(|dim| !CANONICAL_ORDER.contains(&dim.as_str()))
    {
        return Err(ComponentError::InvalidInput {
            name: name.to_string(),
            detail: format!("unsupported dimension {dim}"),
        });
    }
    let order: Vec<&str> = CANONICAL_ORDER
        .iter()
        .copied()
        .filter(|dim| array.axis_of(dim).is_some())
        .collect();
    Ok(array.transposed(&order)?)
}

fn float_values(name: &str, array: &LabeledArray) -> Result<Vec<f64>, ComponentError> {
    array
        .values_f64()
        .map(<[f64]>::to_vec)
        .ok_or_else(|| ComponentError::InvalidInput {
            name: name.to_string(),
            detail: format!("expected f64 values, found {}", array.data().dtype_name()),
        })
}

/// Number of vertical points per column of a canonical array.
fn column_height(name: &str, array: &LabeledArray) -> Result<usize, ComponentError> {
    match (array.dims().last(), array.shape().last()) {
        (Some(dim), Some(&nz)) if is_vertical_dim(dim) && nz > 0 => Ok(nz),
        _ => Err(ComponentError::InvalidInput {
            name: name.to_string(),
            detail: "expected a vertical dimension".to_string(),
        }),
    }
}

fn with_values(array: &LabeledArray, values: Vec<f64>) -> Result<LabeledArray, ComponentError> {
    let mut out = array.clone();
    out.set_values_f64(values)?;
    Ok(out)
}

/// A small self-stepping dynamical core.
///
/// Works in canonical dimension order so the result does not depend on how
/// the caller laid out its arrays. Per step it relaxes temperature toward a
/// pressure-dependent equilibrium, applies Rayleigh friction near the
/// surface, diffuses humidity periodically in longitude and adds a seeded
/// temperature perturbation drawn from the context's random stream.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDycore {
    steps_taken: u64,
}

impl ReferenceDycore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }
}

impl Component for ReferenceDycore {
    fn name(&self) -> &str {
        "ReferenceDycore"
    }

    fn capability(&self) -> Capability {
        Capability::SelfStepping
    }

    fn call(
        &mut self,
        state: &PhysicalState,
        timestep: Option<Duration>,
        ctx: &mut InvocationContext,
    ) -> Result<OutputBundle, ComponentError> {
        let dt = timestep
            .ok_or_else(|| ComponentError::TimestepRequired(self.name().to_string()))?
            .as_secs_f64();
        ctx.tracers_mut().register("specific_humidity", "kg/kg")?;
        ctx.packers_mut().register(self.name(), &["specific_humidity"]);

        let temperature = canonical("air_temperature", required(state, "air_temperature")?)?;
        let pressure = canonical("air_pressure", required(state, "air_pressure")?)?;
        let surface = canonical(
            "surface_air_pressure",
            required(state, "surface_air_pressure")?,
        )?;
        let u = canonical("eastward_wind", required(state, "eastward_wind")?)?;
        let v = canonical("northward_wind", required(state, "northward_wind")?)?;
        let q = canonical("specific_humidity", required(state, "specific_humidity")?)?;

        for (name, array) in [
            ("air_pressure", &pressure),
            ("eastward_wind", &u),
            ("northward_wind", &v),
            ("specific_humidity", &q),
        ] {
            if array.shape() != temperature.shape() || array.dims() != temperature.dims() {
                return Err(ComponentError::InvalidInput {
                    name: name.to_string(),
                    detail: format!(
                        "dims {:?} shape {:?} do not match air_temperature",
                        array.dims(),
                        array.shape()
                    ),
                });
            }
        }
        let nz = column_height("air_temperature", &temperature)?;
        let ps = float_values("surface_air_pressure", &surface)?;
        if ps.len() * nz != temperature.len() {
            return Err(ComponentError::InvalidInput {
                name: "surface_air_pressure".to_string(),
                detail: format!(
                    "{} columns given for {} temperature points",
                    ps.len(),
                    temperature.len()
                ),
            });
        }

        let t_old = float_values("air_temperature", &temperature)?;
        let p = float_values("air_pressure", &pressure)?;
        let mut t_new: Vec<f64> = t_old
            .iter()
            .zip(&p)
            .map(|(&t, &p)| t + dt * (equilibrium_temperature(p) - t) / RELAXATION_SECONDS)
            .collect();
        for t in &mut t_new {
            *t += PERTURBATION_AMPLITUDE * ctx.rng_mut().uniform(-1.0, 1.0);
        }

        let friction: Vec<f64> = p
            .iter()
            .enumerate()
            .map(|(e, &p)| {
                let sigma = p / ps[e / nz];
                let weight = ((sigma - FRICTION_SIGMA) / (1.0 - FRICTION_SIGMA)).max(0.0);
                1.0 - dt * FRICTION_RATE * weight
            })
            .collect();
        let damp = |values: Vec<f64>| -> Vec<f64> {
            values.iter().zip(&friction).map(|(x, k)| x * k).collect()
        };
        let u_new = damp(float_values("eastward_wind", &u)?);
        let v_new = damp(float_values("northward_wind", &v)?);

        let q_old = float_values("specific_humidity", &q)?;
        let q_new = match q.axis_of(LON_DIM) {
            Some(0) if q.shape()[0] > 1 => {
                let nx = q.shape()[0];
                let stride = q.len() / nx;
                (0..q_old.len())
                    .map(|e| {
                        let (i, rest) = (e / stride, e % stride);
                        let west = q_old[((i + nx - 1) % nx) * stride + rest];
                        let east = q_old[((i + 1) % nx) * stride + rest];
                        q_old[e] + dt * HUMIDITY_DIFFUSIVITY * (west - 2.0 * q_old[e] + east)
                    })
                    .collect()
            }
            _ => q_old,
        };

        let tendency: Vec<f64> = t_new
            .iter()
            .zip(&t_old)
            .map(|(new, old)| (new - old) / dt)
            .collect();
        let mut diagnostics = PhysicalState::new();
        diagnostics.insert(
            "air_temperature_tendency_from_dynamics",
            with_values(&temperature, tendency)?.with_attr("units", "degK s^-1"),
        );

        let mut new_state = PhysicalState::new();
        if let Some(time) = state.time() {
            new_state.insert(TIME_KEY, time.clone());
        }
        new_state.insert("air_temperature", with_values(&temperature, t_new)?);
        new_state.insert("eastward_wind", with_values(&u, u_new)?);
        new_state.insert("northward_wind", with_values(&v, v_new)?);
        new_state.insert("specific_humidity", with_values(&q, q_new)?);

        self.steps_taken += 1;
        Ok(OutputBundle::Tuple(vec![diagnostics, new_state]))
    }
}

/// Relaxes temperature toward a pressure-dependent equilibrium profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonianCooling {
    pub relaxation_seconds: f64,
}

impl Default for NewtonianCooling {
    fn default() -> Self {
        Self {
            relaxation_seconds: RELAXATION_SECONDS,
        }
    }
}

impl Component for NewtonianCooling {
    fn name(&self) -> &str {
        "NewtonianCooling"
    }

    fn capability(&self) -> Capability {
        Capability::TendencyProducing { implicit: false }
    }

    fn call(
        &mut self,
        state: &PhysicalState,
        _timestep: Option<Duration>,
        _ctx: &mut InvocationContext,
    ) -> Result<OutputBundle, ComponentError> {
        let temperature = required(state, "air_temperature")?;
        let pressure = required(state, "air_pressure")?.transposed(temperature.dims())?;
        let t = float_values("air_temperature", temperature)?;
        let p = float_values("air_pressure", &pressure)?;

        let equilibrium: Vec<f64> = p.iter().map(|&p| equilibrium_temperature(p)).collect();
        let rates: Vec<f64> = t
            .iter()
            .zip(&equilibrium)
            .map(|(t, eq)| (eq - t) / self.relaxation_seconds)
            .collect();

        let mut tendencies = PhysicalState::new();
        tendencies.insert(
            "air_temperature",
            with_values(temperature, rates)?.with_attr("units", "degK s^-1"),
        );
        let mut diagnostics = PhysicalState::new();
        diagnostics.insert(
            "air_temperature_equilibrium",
            with_values(temperature, equilibrium)?.with_attr("units", "degK"),
        );
        Ok(OutputBundle::Tuple(vec![tendencies, diagnostics]))
    }
}

#[cfg(test)]
mod tests {
    use super::{NewtonianCooling, ReferenceDycore, ReferenceStateFactory, get_grid};
    use crate::scenarios::StateFactory;
    use gdh_runtime::{DEFAULT_TIMESTEP, InvocationContext, invoke};
    use gdh_state::{GridSpec, OutputBundle, Permutation, permute_spatial};

    #[test]
    fn grid_has_column_and_volume_layouts() {
        let column = get_grid(GridSpec::column(30)).expect("column grid");
        assert_eq!(column.array("air_pressure").expect("p").shape(), [30]);
        assert_eq!(
            column
                .array("air_pressure_on_interface_levels")
                .expect("p_int")
                .shape(),
            [31]
        );
        assert_eq!(column.array("latitude").expect("lat").ndim(), 0);

        let volume = get_grid(GridSpec::volume(4, 3, 5)).expect("volume grid");
        let p = volume.array("air_pressure").expect("p");
        assert_eq!(p.dims(), ["lon", "lat", "mid_levels"]);
        assert_eq!(p.shape(), [4, 3, 5]);
    }

    #[test]
    fn default_state_is_timestamped_and_finite() {
        let state = ReferenceStateFactory
            .default_state(&NewtonianCooling::default(), GridSpec::column(30))
            .expect("state");
        assert_eq!(state.time().map(|t| t.as_str()), Some("2020-01-01T00:00:00"));
        let t = state.array("air_temperature").expect("t");
        assert_eq!(t.shape(), [30]);
        assert!(t.values_f64().expect("floats").iter().all(|x| x.is_finite()));
    }

    #[test]
    fn dycore_is_deterministic_and_registers_tracer() {
        let state = ReferenceStateFactory
            .default_state(&ReferenceDycore::new(), GridSpec::volume(6, 4, 5))
            .expect("state");
        let mut ctx = InvocationContext::default();
        let first = invoke(&mut ReferenceDycore::new(), &state, DEFAULT_TIMESTEP, &mut ctx)
            .expect("first");
        assert_eq!(ctx.tracers().units("specific_humidity"), Some("kg/kg"));
        assert_eq!(ctx.packers().len(), 1);
        let second = invoke(&mut ReferenceDycore::new(), &state, DEFAULT_TIMESTEP, &mut ctx)
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(ctx.ledger().events().len(), 2);
    }

    #[test]
    fn dycore_ignores_input_layout() {
        let state = ReferenceStateFactory
            .default_state(&ReferenceDycore::new(), GridSpec::volume(6, 4, 5))
            .expect("state");
        let reversed = permute_spatial(&state, Permutation::Reversed).expect("reversed");
        let mut ctx = InvocationContext::default();
        let a = invoke(&mut ReferenceDycore::new(), &state, DEFAULT_TIMESTEP, &mut ctx)
            .expect("canonical");
        let b = invoke(&mut ReferenceDycore::new(), &reversed, DEFAULT_TIMESTEP, &mut ctx)
            .expect("reversed");
        assert_eq!(a, b);
    }

    #[test]
    fn dycore_needs_a_timestep() {
        use gdh_runtime::Component as _;
        let state = ReferenceStateFactory
            .default_state(&ReferenceDycore::new(), GridSpec::column(8))
            .expect("state");
        let err = ReferenceDycore::new()
            .call(&state, None, &mut InvocationContext::default())
            .expect_err("no step");
        assert_eq!(err.reason_code(), "component_timestep_required");
    }

    #[test]
    fn cooling_returns_tendencies_then_diagnostics() {
        let state = ReferenceStateFactory
            .default_state(&NewtonianCooling::default(), GridSpec::volume(3, 2, 4))
            .expect("state");
        let out = invoke(
            &mut NewtonianCooling::default(),
            &state,
            DEFAULT_TIMESTEP,
            &mut InvocationContext::default(),
        )
        .expect("cooling");
        let OutputBundle::Tuple(states) = out else {
            panic!("expected (tendencies, diagnostics)");
        };
        assert_eq!(states.len(), 2);
        assert!(states[0].contains_key("air_temperature"));
        assert!(states[1].contains_key("air_temperature_equilibrium"));
    }
}
