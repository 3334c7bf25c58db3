use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Decode, Encode};

impl<V> Encode for Option<V>
where
    V: Encode + Sync,
{
    async fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            None => writer.write_all(&[0]).await?,
            Some(v) => {
                writer.write_all(&[1]).await?;
                v.encode(writer).await?;
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        match self {
            None => 1,
            Some(v) => 1 + v.size(),
        }
    }
}

impl<V> Decode for Option<V>
where
    V: Decode,
{
    async fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut tag = [0];
        reader.read_exact(&mut tag).await?;
        match tag[0] {
            0 => Ok(None),
            1 => Ok(Some(V::decode(reader).await?)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid option tag",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, SeekFrom};

    use tokio::io::AsyncSeekExt;

    use crate::serdes::{Decode, Encode};

    #[tokio::test]
    async fn encode_decode() {
        let source_0: Option<u64> = Some(7);
        let source_1: Option<u64> = None;
        let source_2: Option<String> = Some("some".to_string());

        let mut bytes = Vec::new();
        let mut cursor = Cursor::new(&mut bytes);

        source_0.encode(&mut cursor).await.unwrap();
        source_1.encode(&mut cursor).await.unwrap();
        source_2.encode(&mut cursor).await.unwrap();

        cursor.seek(SeekFrom::Start(0)).await.unwrap();
        assert_eq!(Option::<u64>::decode(&mut cursor).await.unwrap(), Some(7));
        assert_eq!(Option::<u64>::decode(&mut cursor).await.unwrap(), None);
        assert_eq!(
            Option::<String>::decode(&mut cursor).await.unwrap(),
            Some("some".to_string())
        );
    }
}
