use std::{io, mem::size_of};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Decode, Encode};

macro_rules! implement_num {
    ($struct_name:ty) => {
        impl Encode for $struct_name {
            async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
            where
                W: AsyncWrite + Unpin + Send,
            {
                writer.write_all(&self.to_le_bytes()).await
            }

            fn size(&self) -> usize {
                size_of::<Self>()
            }
        }

        impl Decode for $struct_name {
            async fn decode<R>(reader: &mut R) -> io::Result<Self>
            where
                R: AsyncRead + Unpin + Send,
            {
                let mut bytes = [0u8; size_of::<Self>()];
                reader.read_exact(&mut bytes).await?;

                Ok(Self::from_le_bytes(bytes))
            }
        }
    };
}

implement_num!(u8);
implement_num!(u16);
implement_num!(u32);
implement_num!(u64);
