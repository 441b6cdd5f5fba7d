use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not start the async runtime")]
    Runtime,
    #[display("could not open the cache database")]
    Cache,
    #[display("could not prepare block storage")]
    BlockStore,
    #[display("could not load assets")]
    Load,
}
