use std::str::FromStr;

use nalgebra::{Point, Scalar};
use snafu::ensure;

use crate::{MalformedResponseSnafu, Result, WorldError};

/// Parses a comma separated point such as `12,64,-3`.
pub fn parse_point<T, E, const D: usize>(s: &str) -> Result<Point<T, D>>
where
    T: FromStr<Err = E> + Scalar,
    WorldError: From<E>,
{
    let parts = parse_list::<T, E>(s)?;
    ensure!(parts.len() == D, MalformedResponseSnafu { response: s });
    Ok(Point::<T, D>::from_slice(&parts))
}

/// Parses a comma separated list of values. An empty response is an empty
/// list.
pub fn parse_list<T, E>(s: &str) -> Result<Vec<T>>
where
    T: FromStr<Err = E>,
    WorldError: From<E>,
{
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let values = s
        .split(',')
        .map(|part| part.trim().parse())
        .collect::<Result<Vec<T>, E>>()?;
    Ok(values)
}
