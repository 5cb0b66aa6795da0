//! Enumerable (fan-out) executor
//!
//! Replays an ordered batch of step-sequences, each to completion, before
//! the outer sequence resumes.

use std::collections::VecDeque;

use super::executor::{EnumeratorExecutor, Executor, TestBodyError};
use super::unit::{Coroutine, YieldUnit};

pub struct EnumerableExecutor {
    queue: VecDeque<EnumeratorExecutor>,
    suspension_index: usize,
}

impl EnumerableExecutor {
    pub fn new(routines: Vec<Box<dyn Coroutine>>) -> Self {
        Self {
            queue: routines.into_iter().map(EnumeratorExecutor::new).collect(),
            suspension_index: 0,
        }
    }

    /// Sequences still waiting to finish, including the active one
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl Executor for EnumerableExecutor {
    fn advance(&mut self) -> Result<Option<YieldUnit>, TestBodyError> {
        let Some(head) = self.queue.front_mut() else {
            return Ok(None);
        };

        let unit = match head.advance() {
            Ok(unit) => unit,
            Err(error) => {
                // Remaining members never run once one has failed
                self.queue.clear();
                return Err(error);
            }
        };
        if !head.is_not_completed() {
            self.queue.pop_front();
        }
        if unit.is_some() {
            self.suspension_index += 1;
        }
        Ok(unit)
    }

    fn is_not_completed(&self) -> bool {
        !self.queue.is_empty()
    }

    fn suspension_index(&self) -> usize {
        self.suspension_index
    }
}
