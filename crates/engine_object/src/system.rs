//! The contract between a system and the frame loop that drives it.

/// A unit of per-frame work, ordered against other systems by
/// [`priority`](System::priority).
///
/// The frame loop calls [`initialize`](System::initialize) once, then
/// [`update`](System::update) once per frame in ascending priority order,
/// and [`clean_up`](System::clean_up) once on shutdown in descending order.
pub trait System: Send {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Lower values run first.
    fn priority(&self) -> i32;

    /// One-time setup before the first frame.
    ///
    /// # Errors
    ///
    /// A failure aborts start-up of the frame loop.
    fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Advances the system by one frame.
    fn update(&mut self);

    /// Releases everything the system owns.
    fn clean_up(&mut self);
}
