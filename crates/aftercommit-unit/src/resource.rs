/// The transactional collaborator a unit of work drives.
///
/// A unit calls [`begin`](Resource::begin) when it is created, and exactly one
/// of [`commit`](Resource::commit) or [`rollback`](Resource::rollback) when it
/// completes. After-phase actions are only dispatched once that call has
/// returned, so they never run before the write is durable (or discarded).
pub trait Resource: Send + Sync + 'static {
    /// Write capability held by an active unit.
    type Transaction: Send + 'static;

    /// Error type for resource failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot start a transaction.
    fn begin(&self) -> Result<Self::Transaction, Self::Error>;

    /// Make the transaction's writes durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes could not be committed; the unit is
    /// then treated as rolled back.
    fn commit(&self, transaction: Self::Transaction) -> Result<(), Self::Error>;

    /// Discard the transaction's writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback itself failed. The unit's outcome is
    /// still rolled back.
    fn rollback(&self, transaction: Self::Transaction) -> Result<(), Self::Error>;
}
