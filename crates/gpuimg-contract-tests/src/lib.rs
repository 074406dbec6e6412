#![forbid(unsafe_code)]


#[cfg(test)]
mod facade;
#[cfg(test)]
mod graph;
#[cfg(test)]
mod rendering;
