//! Fixture bookkeeping for intercepted provider calls.
//!
//! A registry answers calls with fixtures and counts how often each one was
//! used. Calls nothing answers are kept so the usage report can show what
//! was actually asked for.

use std::sync::{PoisonError, RwLock};

use crate::check::{select_closest, type_matches};
use crate::diag::{Diagnostic, Diagnostics};
use crate::render;
use crate::spec::Fixture;
use crate::value::Value;

/// How a registry matches calls against its fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    /// Data source answers, matched on the exact query. Null attributes
    /// count as unset.
    Mock,
    /// Planned attribute overrides, matched on the closest query.
    Expect,
}

impl FixtureKind {
    fn noun(self) -> &'static str {
        match self {
            FixtureKind::Mock => "mock",
            FixtureKind::Expect => "expect",
        }
    }
}

/// A call no fixture answered.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedCall {
    pub type_name: String,
    pub query: Value,
}

#[derive(Debug, Default)]
struct RegistryState {
    fixtures: Vec<Fixture>,
    unmatched: Vec<UnmatchedCall>,
    /// Bumped on every install so a lookup can detect a stale index.
    generation: u64,
}

/// Thread-safe fixture registry shared by every interceptor of a test case.
#[derive(Debug)]
pub struct Registry {
    kind: FixtureKind,
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(kind: FixtureKind) -> Self {
        Self {
            kind,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn mocks() -> Self {
        Self::new(FixtureKind::Mock)
    }

    pub fn expects() -> Self {
        Self::new(FixtureKind::Expect)
    }

    pub fn kind(&self) -> FixtureKind {
        self.kind
    }

    /// Replaces the fixtures and forgets previously unmatched calls.
    pub fn install(&self, fixtures: Vec<Fixture>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.fixtures = fixtures;
        state.unmatched.clear();
        state.generation += 1;
    }

    /// Answers a call for `type_name` with `query`.
    ///
    /// Fixtures scoped to `context` are preferred, then unscoped ones. On a
    /// hit the fixture's call count is bumped and its data returned; on a
    /// miss the call is recorded and `None` returned so the caller can fall
    /// back to its own value.
    pub fn lookup(&self, type_name: &str, query: &Value, context: Option<&str>) -> Option<Value> {
        loop {
            let (found, generation) = {
                let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
                (self.find(&state.fixtures, type_name, query, context), state.generation)
            };

            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if guard.generation != generation {
                continue;
            }
            let state = &mut *guard;
            return match found.and_then(|i| state.fixtures.get_mut(i)) {
                Some(fixture) => {
                    fixture.calls += 1;
                    tracing::debug!(
                        kind = self.kind.noun(),
                        fixture = %fixture.type_name,
                        calls = fixture.calls,
                        "fixture matched"
                    );
                    Some(fixture.data.clone())
                }
                None => {
                    tracing::debug!(kind = self.kind.noun(), type_name, "no fixture matched");
                    state.unmatched.push(UnmatchedCall {
                        type_name: type_name.to_string(),
                        query: query.clone(),
                    });
                    None
                }
            };
        }
    }

    fn find(&self, fixtures: &[Fixture], type_name: &str, query: &Value, context: Option<&str>) -> Option<usize> {
        let scoped = |f: &Fixture| context.is_some() && f.provider.as_deref() == context;
        let unscoped = |f: &Fixture| f.provider.is_none();

        for tier in [&scoped as &dyn Fn(&Fixture) -> bool, &unscoped] {
            let candidates = fixtures
                .iter()
                .enumerate()
                .filter(|(_, f)| type_matches(&f.type_name.type_name, type_name) && tier(f));
            let found = match self.kind {
                FixtureKind::Mock => candidates
                    .filter(|(_, f)| f.query.eq_ignoring_nulls(query))
                    .map(|(i, _)| i)
                    .next(),
                FixtureKind::Expect => {
                    let indexed: Vec<Indexed<'_>> = candidates.map(|(i, f)| Indexed(i, f)).collect();
                    select_closest(type_name, &indexed, query).map(|(c, _)| c.0)
                }
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Returns a copy of the installed fixtures with their call counts.
    pub fn fixtures(&self) -> Vec<Fixture> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.fixtures.clone()
    }

    /// Returns the calls no fixture answered, in arrival order.
    pub fn unmatched_calls(&self) -> Vec<UnmatchedCall> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.unmatched.clone()
    }

    /// Reports one diagnostic per fixture: an error if it was never called,
    /// listing the calls nothing answered, otherwise its call count.
    pub fn report(&self) -> Diagnostics {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut diags = Diagnostics::new();
        let mut missed: Option<String> = None;

        for fixture in &state.fixtures {
            let path = fixture.type_name.path();
            if fixture.called() {
                diags.add(Diagnostic::success(
                    path,
                    format!("{} has been called {} time(s)", self.kind.noun(), fixture.calls),
                ));
                continue;
            }
            let calls = missed.get_or_insert_with(|| {
                state
                    .unmatched
                    .iter()
                    .map(|c| self.render_call(c))
                    .collect::<String>()
            });
            let detail = match self.kind {
                FixtureKind::Mock => format!(
                    "No data source matched :\n{}\nUncatched data source calls are :\n{}",
                    fixture.body, calls
                ),
                FixtureKind::Expect => format!(
                    "No resource matched :\n{} {}\nUncatched resource calls are :\n{}",
                    fixture.type_name.type_name, fixture.body, calls
                ),
            };
            diags.error(path, detail);
        }
        diags
    }

    fn render_call(&self, call: &UnmatchedCall) -> String {
        match self.kind {
            FixtureKind::Mock => format!("{}\n", render::to_hcl(&call.query)),
            FixtureKind::Expect => format!("{}\n", render::to_block(&call.type_name, &[], &call.query)),
        }
    }
}

/// Keeps a fixture's position while it is scored.
struct Indexed<'a>(usize, &'a Fixture);

impl crate::check::Candidate for Indexed<'_> {
    fn type_name(&self) -> &str {
        &self.1.type_name.type_name
    }

    fn declared(&self) -> &Value {
        &self.1.query
    }
}
