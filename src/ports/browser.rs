//! Browser driver ports for running test pages in real browsers.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed error type shared by the driver ports.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Boxed future type alias used by the driver ports to keep them dyn-compatible.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 'a>>;

/// Starts the shared driver service for one harness run.
pub trait BrowserLauncher: Send + Sync {
    /// Starts the driver service (e.g. a `chromedriver` process).
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be started.
    fn start(&self) -> DriverFuture<'_, Box<dyn DriverService>>;
}

/// A running driver service able to create browser sessions concurrently.
pub trait DriverService: Send + Sync {
    /// Creates a new headless browser session with browser logging enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be created.
    fn new_session(&self) -> DriverFuture<'_, Box<dyn BrowserSession>>;

    /// Stops the service. Must be safe to call once all sessions are gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the service could not be stopped cleanly.
    fn stop(&self) -> DriverFuture<'_, ()>;
}

/// A single browser session.
pub trait BrowserSession: Send {
    /// Navigates to the given URL and waits for the page load.
    ///
    /// # Errors
    ///
    /// Returns an error if navigation fails.
    fn navigate<'a>(&'a mut self, url: &'a str) -> DriverFuture<'a, ()>;

    /// Sets the asynchronous script execution timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the timeout.
    fn set_script_timeout(&mut self, timeout: Duration) -> DriverFuture<'_, ()>;

    /// Executes an asynchronous script, resolving with the value passed to
    /// the script's completion callback.
    ///
    /// # Errors
    ///
    /// Returns an error on script failure or script timeout.
    fn execute_async_script<'a>(&'a mut self, script: &'a str)
        -> DriverFuture<'a, serde_json::Value>;

    /// Returns the browser console log lines collected so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs cannot be retrieved.
    fn browser_logs(&mut self) -> DriverFuture<'_, Vec<String>>;

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to close the session.
    fn quit(self: Box<Self>) -> DriverFuture<'static, ()>;
}
