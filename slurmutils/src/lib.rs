// Misc utilities for reading Slurm's text formats, useful to both squeuelog and jobexporter.

mod command;
mod elapsed;
mod hostlist;

// Run an external program with a time limit, returning its output.

pub use command::run_with_timeout;
pub use command::CommandError;

// Convert a Slurm elapsed-time string (MM:SS, HH:MM:SS, D-HH:MM:SS) to seconds.

pub use elapsed::parse_elapsed;
pub use elapsed::ElapsedError;

// Expand a Slurm host list expression, eg `c[01-03,7],login`, into host names.

pub use hostlist::expand_hostlist;

// Ditto, and also count the range items that had to be dropped.

pub use hostlist::expand_hostlist_counted;

// Largest number of names a single range item may expand to.

pub use hostlist::MAX_RANGE_SIZE;

// Formatter for sets of host names: the inverse of expansion.

pub use hostlist::compress_hostnames;
