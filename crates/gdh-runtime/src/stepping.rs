#![forbid(unsafe_code)]

use crate::{Capability, Component, ComponentError, InvocationContext};
use gdh_state::{OutputBundle, PhysicalState, StateValue};
use std::collections::VecDeque;
use std::time::Duration;

pub const MAX_ADAMS_BASHFORTH_ORDER: usize = 3;

/// Wraps a tendency producer into something that can be stepped.
pub trait IntegratorFactory {
    fn wrap(&self, component: Box<dyn Component>) -> Result<Box<dyn Component>, ComponentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdamsBashforthFactory {
    pub order: usize,
}

impl Default for AdamsBashforthFactory {
    fn default() -> Self {
        Self {
            order: MAX_ADAMS_BASHFORTH_ORDER,
        }
    }
}

impl IntegratorFactory for AdamsBashforthFactory {
    fn wrap(&self, component: Box<dyn Component>) -> Result<Box<dyn Component>, ComponentError> {
        Ok(Box::new(AdamsBashforth::with_order(component, self.order)?))
    }
}

fn coefficients(history_len: usize) -> &'static [f64] {
    match history_len {
        1 => &[1.0],
        2 => &[1.5, -0.5],
        _ => &[23.0 / 12.0, -16.0 / 12.0, 5.0 / 12.0],
    }
}

/// Explicit Adams-Bashforth integrator of order 1 to 3.
///
/// The first call is forward Euler; once enough tendency history exists the
/// full-order coefficients apply. Output is `(diagnostics, new_state)` where
/// `new_state` holds every variable that has a tendency.
pub struct AdamsBashforth {
    inner: Box<dyn Component>,
    name: String,
    order: usize,
    history: VecDeque<PhysicalState>,
}

impl AdamsBashforth {
    pub fn new(inner: Box<dyn Component>) -> Result<Self, ComponentError> {
        Self::with_order(inner, MAX_ADAMS_BASHFORTH_ORDER)
    }

    pub fn with_order(inner: Box<dyn Component>, order: usize) -> Result<Self, ComponentError> {
        if !inner.capability().produces_tendencies() {
            return Err(ComponentError::NotTendencyProducing(inner.name().to_string()));
        }
        if !(1..=MAX_ADAMS_BASHFORTH_ORDER).contains(&order) {
            return Err(ComponentError::InvalidInput {
                name: "order".to_string(),
                detail: format!(
                    "Adams-Bashforth order must be 1..={MAX_ADAMS_BASHFORTH_ORDER}, got {order}"
                ),
            });
        }
        let name = format!("AdamsBashforth({})", inner.name());
        Ok(Self {
            inner,
            name,
            order,
            history: VecDeque::with_capacity(order),
        })
    }

    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn split_output(
        &self,
        output: OutputBundle,
    ) -> Result<(PhysicalState, PhysicalState), ComponentError> {
        match output {
            OutputBundle::Single(tendencies) => Ok((tendencies, PhysicalState::new())),
            OutputBundle::Tuple(states) if states.len() == 2 => {
                let mut states = states.into_iter();
                match (states.next(), states.next()) {
                    (Some(tendencies), Some(diagnostics)) => Ok((tendencies, diagnostics)),
                    _ => Err(ComponentError::InvalidOutput(format!(
                        "{} returned an incomplete (tendencies, diagnostics) pair",
                        self.inner.name()
                    ))),
                }
            }
            OutputBundle::Tuple(states) => Err(ComponentError::InvalidOutput(format!(
                "{} returned {} outputs, expected (tendencies, diagnostics)",
                self.inner.name(),
                states.len()
            ))),
        }
    }
}

impl Component for AdamsBashforth {
    fn name(&self) -> &str {
        &self.name
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
        let step = timestep.ok_or_else(|| ComponentError::TimestepRequired(self.name.clone()))?;
        let inner_step = self
            .inner
            .capability()
            .requires_timestep()
            .then_some(step);
        let output = self.inner.call(state, inner_step, ctx)?;
        let (tendencies, diagnostics) = self.split_output(output)?;

        self.history.push_front(tendencies);
        self.history.truncate(self.order);
        let weights = coefficients(self.history.len());
        let dt = step.as_secs_f64();

        let mut new_state = PhysicalState::new();
        for (name, value) in self.history[0].iter() {
            let StateValue::Array(_) = value else {
                continue;
            };
            let current = state
                .array(name)
                .ok_or_else(|| ComponentError::MissingInput(name.to_string()))?;
            let mut values = current
                .values_f64()
                .ok_or_else(|| ComponentError::InvalidInput {
                    name: name.to_string(),
                    detail: "only float fields can be time-stepped".to_string(),
                })?
                .to_vec();

            for (weight, past) in weights.iter().zip(&self.history) {
                let tendency = past
                    .array(name)
                    .ok_or_else(|| {
                        ComponentError::InvalidOutput(format!(
                            "tendency for {name} missing from earlier step"
                        ))
                    })?
                    .aligned_to(current.dims())?;
                let rates = tendency.values_f64().ok_or_else(|| {
                    ComponentError::InvalidOutput(format!("tendency for {name} is not float"))
                })?;
                if rates.len() != values.len() {
                    return Err(ComponentError::InvalidOutput(format!(
                        "tendency for {name} has {} values, state has {}",
                        rates.len(),
                        values.len()
                    )));
                }
                for (value, rate) in values.iter_mut().zip(rates) {
                    *value += dt * weight * rate;
                }
            }

            let mut next = current.clone();
            next.set_values_f64(values)?;
            new_state.insert(name, next);
        }

        Ok(OutputBundle::Tuple(vec![diagnostics, new_state]))
    }
}
