//! Sequential state machine (SSM) engine.
//!
//! A machine is an ordered list of states `0..N-1` and a handler that is
//! invoked once per state entry. On every invocation the handler either
//! advances (by one, or by jumping), fails the machine, or starts a child
//! machine as the whole action of the current state. A child that completes
//! successfully advances its parent by one; a child that fails hands its
//! error to the parent, which completes immediately.
//!
//! The engine drives the whole tree on the calling thread with an explicit
//! stack, so nesting depth is not limited by recursion and a parent never
//! resumes while a child is active.

use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::error::{DriverError, Result};

/// Hooks the engine needs from whatever the machines operate on.
pub trait MachineContext {
    /// Checked at every state entry; an error fails the running machine.
    fn check_cancelled(&self) -> Result<()>;

    fn on_machine_started(&self, _machine: &'static str, _depth: usize) {}

    fn on_machine_completed(&self, _machine: &'static str, _error: Option<&DriverError>) {}
}

/// What a handler decided for the current state.
pub enum Transition<C> {
    /// Advance to the next state.
    Next,
    /// Continue at the given state. Out-of-range completes the machine.
    Jump(usize),
    /// Set the error slot and complete.
    Fail(DriverError),
    /// Run a child machine; the parent resumes when it completes.
    Child(Ssm<C>),
}

/// One implementation per machine kind.
pub trait StateHandler<C> {
    fn name(&self) -> &'static str;

    fn state_count(&self) -> usize;

    /// Human-readable state name for logs.
    fn state_name(&self, _state: usize) -> &'static str {
        "-"
    }

    fn run_state(&mut self, state: usize, ctx: &mut C) -> Transition<C>;
}

/// A state machine instance.
pub struct Ssm<C> {
    handler: Box<dyn StateHandler<C>>,
    cur_state: usize,
    error: Option<DriverError>,
}

impl<C: MachineContext> Ssm<C> {
    /// Create a machine in state 0 with the error slot unset.
    pub fn new(handler: impl StateHandler<C> + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            cur_state: 0,
            error: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    pub fn state_count(&self) -> usize {
        self.handler.state_count()
    }

    pub fn current_state(&self) -> usize {
        self.cur_state
    }

    pub fn error(&self) -> Option<&DriverError> {
        self.error.as_ref()
    }

    /// First error wins.
    fn fail(&mut self, err: DriverError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn is_running(&self) -> bool {
        self.error.is_none() && self.cur_state < self.state_count()
    }

    fn finish(&mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run the machine to completion.
    ///
    /// `on_complete` is invoked exactly once, after the last state or the
    /// first error, and the machine is dropped afterwards.
    pub fn start<F>(self, ctx: &mut C, on_complete: F)
    where
        F: FnOnce(&mut C, Result<()>),
    {
        let mut current = self;
        let mut parents: Vec<Ssm<C>> = Vec::new();

        debug!(machine = current.name(), "Machine start");
        ctx.on_machine_started(current.name(), 0);

        loop {
            if current.is_running() {
                if let Err(e) = ctx.check_cancelled() {
                    current.fail(e);
                    continue;
                }

                let state = current.cur_state;
                trace!(
                    machine = current.name(),
                    state,
                    name = current.handler.state_name(state),
                    depth = parents.len(),
                    "Enter state"
                );

                match current.handler.run_state(state, ctx) {
                    Transition::Next => current.cur_state += 1,
                    Transition::Jump(target) => current.cur_state = target,
                    Transition::Fail(e) => current.fail(e),
                    Transition::Child(child) => {
                        let depth = parents.len() + 1;
                        debug!(parent = current.name(), machine = child.name(), depth, "Child start");
                        ctx.on_machine_started(child.name(), depth);
                        parents.push(current);
                        current = child;
                    }
                }
                continue;
            }

            let name = current.name();
            let result = current.finish();
            match &result {
                Ok(()) => debug!(machine = name, "Machine complete"),
                Err(e) => debug!(machine = name, error = %e, "Machine failed"),
            }
            ctx.on_machine_completed(name, result.as_ref().err());

            match parents.pop() {
                None => {
                    on_complete(ctx, result);
                    return;
                }
                Some(mut parent) => {
                    match result {
                        Ok(()) => parent.cur_state += 1,
                        Err(e) => parent.fail(e),
                    }
                    current = parent;
                }
            }
        }
    }

    /// `start` with a completion that hands the result back.
    pub fn run(self, ctx: &mut C) -> Result<()> {
        let mut outcome = None;
        self.start(ctx, |_, result| outcome = Some(result));
        outcome.unwrap_or_else(|| Err(DriverError::invalid_state("machine did not complete")))
    }
}

impl<C: MachineContext + 'static> Ssm<C> {
    /// Create a machine from a closure handler.
    pub fn from_fn<F>(name: &'static str, state_count: usize, f: F) -> Self
    where
        F: FnMut(usize, &mut C) -> Transition<C> + 'static,
    {
        Self::new(FnHandler {
            name,
            state_count,
            f,
            _ctx: PhantomData,
        })
    }
}

/// Closure-backed handler.
pub struct FnHandler<C, F> {
    name: &'static str,
    state_count: usize,
    f: F,
    _ctx: PhantomData<fn(&mut C)>,
}

impl<C, F> StateHandler<C> for FnHandler<C, F>
where
    F: FnMut(usize, &mut C) -> Transition<C>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn state_count(&self) -> usize {
        self.state_count
    }

    fn run_state(&mut self, state: usize, ctx: &mut C) -> Transition<C> {
        (self.f)(state, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    use std::cell::RefCell;

    #[derive(Default)]
    struct TestCtx {
        trace: Vec<(&'static str, usize)>,
        cancelled: bool,
    }

    impl MachineContext for TestCtx {
        fn check_cancelled(&self) -> Result<()> {
            if self.cancelled {
                Err(DriverError::Cancelled)
            } else {
                Ok(())
            }
        }
    }

    /// Logs every entry and advances.
    fn linear(name: &'static str, count: usize) -> Ssm<TestCtx> {
        Ssm::from_fn(name, count, move |state, ctx: &mut TestCtx| {
            ctx.trace.push((name, state));
            Transition::Next
        })
    }

    fn stall() -> DriverError {
        DriverError::transfer(0x01, TransportError::Stall { endpoint: 0x01 })
    }

    #[test]
    fn test_linear_machine_completes_once() {
        for k in 0..6 {
            let mut ctx = TestCtx::default();
            let mut completions = 0;
            let mut outcome = None;

            linear("m", k).start(&mut ctx, |_, r| {
                completions += 1;
                outcome = Some(r);
            });

            assert_eq!(completions, 1);
            assert!(outcome.unwrap().is_ok());
            assert_eq!(ctx.trace.len(), k);
            assert_eq!(ctx.trace, (0..k).map(|s| ("m", s)).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_child_runs_before_parent_resumes() {
        let mut ctx = TestCtx::default();
        let parent = Ssm::from_fn("parent", 3, |state, ctx: &mut TestCtx| {
            ctx.trace.push(("parent", state));
            if state == 1 {
                Transition::Child(linear("child", 2))
            } else {
                Transition::Next
            }
        });

        parent.run(&mut ctx).unwrap();
        assert_eq!(
            ctx.trace,
            vec![("parent", 0), ("parent", 1), ("child", 0), ("child", 1), ("parent", 2)]
        );
    }

    #[test]
    fn test_child_error_unwinds_parent() {
        let mut ctx = TestCtx::default();
        let child = Ssm::from_fn("child", 4, |state, ctx: &mut TestCtx| {
            ctx.trace.push(("child", state));
            if state == 2 {
                Transition::Fail(stall())
            } else {
                Transition::Next
            }
        });
        let mut child = Some(child);
        let parent = Ssm::from_fn("parent", 3, move |state, ctx: &mut TestCtx| {
            ctx.trace.push(("parent", state));
            if state == 1
                && let Some(c) = child.take()
            {
                return Transition::Child(c);
            }
            Transition::Next
        });

        let mut seen = None;
        parent.start(&mut ctx, |_, r| seen = Some(r));

        let err = seen.unwrap().unwrap_err();
        assert!(matches!(err, DriverError::Transfer { endpoint: 0x01, .. }));
        // Parent never re-enters state 1 nor reaches state 2.
        assert_eq!(
            ctx.trace,
            vec![("parent", 0), ("parent", 1), ("child", 0), ("child", 1), ("child", 2)]
        );
    }

    #[test]
    fn test_error_propagates_through_three_levels() {
        let mut ctx = TestCtx::default();
        let leaf = Ssm::from_fn("leaf", 2, |_, _: &mut TestCtx| Transition::Fail(DriverError::Cancelled));
        let mut leaf = Some(leaf);
        let mid = Ssm::from_fn("mid", 2, move |_, _: &mut TestCtx| match leaf.take() {
            Some(l) => Transition::Child(l),
            None => Transition::Next,
        });
        let mut mid = Some(mid);
        let root = Ssm::from_fn("root", 2, move |state, ctx: &mut TestCtx| {
            ctx.trace.push(("root", state));
            match mid.take() {
                Some(m) => Transition::Child(m),
                None => Transition::Next,
            }
        });

        assert!(root.run(&mut ctx).unwrap_err().is_cancelled());
        assert_eq!(ctx.trace, vec![("root", 0)]);
    }

    #[test]
    fn test_first_error_wins() {
        let mut m = linear("m", 1);
        m.fail(DriverError::Cancelled);
        m.fail(stall());
        assert!(m.error().unwrap().is_cancelled());
    }

    #[test]
    fn test_jump() {
        let mut ctx = TestCtx::default();
        let mut laps = 0;
        let m = Ssm::from_fn("m", 3, move |state, ctx: &mut TestCtx| {
            ctx.trace.push(("m", state));
            match state {
                1 if laps < 2 => {
                    laps += 1;
                    Transition::Jump(0)
                }
                _ => Transition::Next,
            }
        });

        m.run(&mut ctx).unwrap();
        let states: Vec<usize> = ctx.trace.iter().map(|(_, s)| *s).collect();
        assert_eq!(states, vec![0, 1, 0, 1, 0, 1, 2]);
    }

    #[test]
    fn test_jump_out_of_range_completes() {
        let mut ctx = TestCtx::default();
        let m = Ssm::from_fn("m", 3, |state, ctx: &mut TestCtx| {
            ctx.trace.push(("m", state));
            Transition::Jump(10)
        });
        m.run(&mut ctx).unwrap();
        assert_eq!(ctx.trace.len(), 1);
    }

    #[test]
    fn test_cancellation_checked_at_state_entry() {
        let mut ctx = TestCtx::default();
        let m = Ssm::from_fn("m", 4, |state, ctx: &mut TestCtx| {
            ctx.trace.push(("m", state));
            if state == 1 {
                ctx.cancelled = true;
            }
            Transition::Next
        });

        let err = m.run(&mut ctx).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(ctx.trace, vec![("m", 0), ("m", 1)]);
    }

    #[test]
    fn test_lifecycle_hooks() {
        #[derive(Default)]
        struct Hooked {
            started: RefCell<Vec<(&'static str, usize)>>,
            completed: RefCell<Vec<(&'static str, bool)>>,
        }

        impl MachineContext for Hooked {
            fn check_cancelled(&self) -> Result<()> {
                Ok(())
            }

            fn on_machine_started(&self, machine: &'static str, depth: usize) {
                self.started.borrow_mut().push((machine, depth));
            }

            fn on_machine_completed(&self, machine: &'static str, error: Option<&DriverError>) {
                self.completed.borrow_mut().push((machine, error.is_none()));
            }
        }

        let mut ctx = Hooked::default();
        let mut child = Some(Ssm::from_fn("child", 1, |_, _: &mut Hooked| Transition::Next));
        let root = Ssm::from_fn("root", 2, move |_, _: &mut Hooked| match child.take() {
            Some(c) => Transition::Child(c),
            None => Transition::Next,
        });

        root.run(&mut ctx).unwrap();
        assert_eq!(*ctx.started.borrow(), vec![("root", 0), ("child", 1)]);
        assert_eq!(*ctx.completed.borrow(), vec![("child", true), ("root", true)]);
    }
}
