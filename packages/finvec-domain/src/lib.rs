pub mod task;
pub mod text;

use std::{future::Future, pin::Pin};

pub use task::{ParseStatusError, RetryDecision, RetryPolicy, TaskStatus};
pub use text::{Direction, ParseDirectionError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
