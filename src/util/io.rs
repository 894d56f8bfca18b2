use futures_core::ready;
use futures_io::{AsyncBufRead, AsyncWrite};
use std::future::Future;
use std::io::Result;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future-returning helpers for buffered connections.
pub trait AsyncBufReadExt: AsyncBufRead {
	/// Waits for buffered input and hands it to `inspect`.
	///
	/// `inspect` sees the buffered bytes (empty once the connection has closed) and returns how
	/// many of them to consume, together with a value the future resolves to. It is not called if
	/// filling the buffer fails.
	fn read_buf<T, F: FnOnce(&'_ [u8]) -> (usize, T) + Unpin>(
		self: Pin<&mut Self>,
		inspect: F,
	) -> ReadBufFuture<'_, Self, T, F> {
		ReadBufFuture {
			reader: self,
			inspect: Some(inspect),
		}
	}
}

impl<R: AsyncBufRead + ?Sized> AsyncBufReadExt for R {}

/// Future-returning helpers for outbound connections.
pub trait AsyncWriteExt: AsyncWrite {
	/// Writes all of `data`, across as many writes as the connection needs.
	///
	/// A connection that accepts zero bytes fails the future with
	/// [`WriteZero`](std::io::ErrorKind::WriteZero).
	fn write_all<'a>(self: Pin<&'a mut Self>, data: &'a [u8]) -> WriteAllFuture<'a, Self> {
		WriteAllFuture {
			writer: self,
			remaining: data,
		}
	}

	/// Flushes the connection.
	fn flush(self: Pin<&mut Self>) -> FlushFuture<'_, Self> {
		FlushFuture { writer: self }
	}
}

impl<W: AsyncWrite + ?Sized> AsyncWriteExt for W {}

/// The future returned by [`AsyncBufReadExt::read_buf`].
#[derive(Debug)]
pub struct ReadBufFuture<'a, R: AsyncBufRead + ?Sized, T, F: FnOnce(&[u8]) -> (usize, T) + Unpin> {
	reader: Pin<&'a mut R>,
	inspect: Option<F>,
}

impl<R: AsyncBufRead + ?Sized, T, F: FnOnce(&[u8]) -> (usize, T) + Unpin> Future
	for ReadBufFuture<'_, R, T, F>
{
	type Output = Result<T>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		let buffered = ready!(this.reader.as_mut().poll_fill_buf(cx))?;
		let inspect = match this.inspect.take() {
			Some(inspect) => inspect,
			None => {
				return Poll::Ready(Err(std::io::Error::new(
					std::io::ErrorKind::Other,
					"read_buf polled after completion",
				)))
			}
		};
		let (used, value) = inspect(buffered);
		this.reader.as_mut().consume(used);
		Poll::Ready(Ok(value))
	}
}

/// The future returned by [`AsyncWriteExt::write_all`].
#[derive(Debug)]
pub struct WriteAllFuture<'a, W: AsyncWrite + ?Sized> {
	writer: Pin<&'a mut W>,
	remaining: &'a [u8],
}

impl<W: AsyncWrite + ?Sized> Future for WriteAllFuture<'_, W> {
	type Output = Result<()>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = &mut *self;
		while !this.remaining.is_empty() {
			match ready!(this.writer.as_mut().poll_write(cx, this.remaining))? {
				0 => return Poll::Ready(Err(std::io::ErrorKind::WriteZero.into())),
				n => this.remaining = &this.remaining[n..],
			}
		}
		Poll::Ready(Ok(()))
	}
}

/// The future returned by [`AsyncWriteExt::flush`].
#[derive(Debug)]
pub struct FlushFuture<'a, W: AsyncWrite + ?Sized> {
	writer: Pin<&'a mut W>,
}

impl<W: AsyncWrite + ?Sized> Future for FlushFuture<'_, W> {
	type Output = Result<()>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.writer.as_mut().poll_flush(cx)
	}
}
