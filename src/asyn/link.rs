//! Parsing of asyn record links, `@asyn(PORT, ADDR[, TIMEOUT])DRVINFO`.

use std::{fmt, str::FromStr, time::Duration};

use nom::{
    Finish, IResult, Parser,
    bytes::complete::{tag, take_till1},
    character::complete::{char, i32 as parse_i32, multispace0},
    combinator::{map, map_res, opt, rest},
    number::complete::double,
    sequence::preceded,
};
use thiserror::Error;

/// The address part of an INP/OUT field
#[derive(Debug, Clone, PartialEq)]
pub struct AsynLink {
    pub port: String,
    pub addr: i32,
    pub timeout: Option<Duration>,
    /// Driver info string, the PV name for this interface
    pub drv_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Malformed asyn link '{link}' at position {position}")]
    Malformed { link: String, position: usize },
    #[error("Link targets port {found}, expected {expected}")]
    WrongPort { expected: String, found: String },
}

impl AsynLink {
    pub fn new(port: &str, addr: i32, drv_info: &str) -> Self {
        AsynLink {
            port: port.to_owned(),
            addr,
            timeout: None,
            drv_info: drv_info.to_owned(),
        }
    }
}

fn separator(input: &str) -> IResult<&str, char> {
    preceded(multispace0, char(',')).parse(input)
}

fn parse_link(input: &str) -> IResult<&str, AsynLink> {
    map(
        (
            preceded(
                (multispace0, tag("@asyn("), multispace0),
                take_till1(|c: char| c == ',' || c == ')' || c.is_whitespace()),
            ),
            opt(preceded((separator, multispace0), parse_i32)),
            opt(preceded(
                (separator, multispace0),
                map_res(double, Duration::try_from_secs_f64),
            )),
            preceded((multispace0, char(')')), rest),
        ),
        |(port, addr, timeout, drv_info): (&str, Option<i32>, Option<Duration>, &str)| AsynLink {
            port: port.to_owned(),
            addr: addr.unwrap_or(0),
            timeout,
            drv_info: drv_info.trim().to_owned(),
        },
    )
    .parse(input)
}

impl FromStr for AsynLink {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_link(s)
            .finish()
            .map(|(_, link)| link)
            .map_err(|e| LinkError::Malformed {
                link: s.to_owned(),
                position: s.len() - e.input.len(),
            })
    }
}

impl fmt::Display for AsynLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@asyn({}, {}", self.port, self.addr)?;
        if let Some(timeout) = self.timeout {
            write!(f, ", {}", timeout.as_secs_f64())?;
        }
        write!(f, "){}", self.drv_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_links() {
        let link: AsynLink = "@asyn(DEV, 0)Node-Temperature".parse().unwrap();
        assert_eq!(link, AsynLink::new("DEV", 0, "Node-Temperature"));
        assert_eq!(link.to_string(), "@asyn(DEV, 0)Node-Temperature");
    }

    #[test]
    fn optional_parts() {
        let link: AsynLink = "@asyn(PORT1,3,0.5) Gain".parse().unwrap();
        assert_eq!(link.port, "PORT1");
        assert_eq!(link.addr, 3);
        assert_eq!(link.timeout, Some(Duration::from_millis(500)));
        assert_eq!(link.drv_info, "Gain");

        let link: AsynLink = "@asyn(PORT1)".parse().unwrap();
        assert_eq!(link.addr, 0);
        assert_eq!(link.drv_info, "");
    }

    #[test]
    fn malformed() {
        assert!(matches!(
            "@asin(PORT, 0)X".parse::<AsynLink>(),
            Err(LinkError::Malformed { position: 0, .. })
        ));
        assert!("@asyn(PORT, zero)X".parse::<AsynLink>().is_err());
        assert!("@asyn(PORT, 0, -1)X".parse::<AsynLink>().is_err());
    }
}
