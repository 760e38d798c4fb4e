mod intervals;
mod sessions;
