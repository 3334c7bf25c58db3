mod num;
mod option;
mod string;

use std::{future::Future, io};

use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) trait Encode {
    fn encode<W>(&self, writer: &mut W) -> impl Future<Output = io::Result<()>> + Send
    where
        W: AsyncWrite + Unpin + Send;

    fn size(&self) -> usize;
}

impl<T: Encode + Sync> Encode for &T {
    async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        Encode::encode(*self, writer).await
    }

    fn size(&self) -> usize {
        Encode::size(*self)
    }
}

pub(crate) trait Decode: Sized {
    fn decode<R>(reader: &mut R) -> impl Future<Output = io::Result<Self>> + Send
    where
        R: AsyncRead + Unpin + Send;
}
