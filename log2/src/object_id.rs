/// Something that identifies an object in a log record, like a resource name or a `(resource group, name)` pair.
///
/// Multi-part IDs are rendered joined with `/`.
pub trait ObjectId {
	fn fmt_id(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result;
}

impl<T> ObjectId for &'_ T where T: AsRef<str> + ?Sized {
	fn fmt_id(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str((*self).as_ref())
	}
}

impl<T1, T2> ObjectId for (&'_ T1, &'_ T2)
where
	T1: AsRef<str> + ?Sized,
	T2: AsRef<str> + ?Sized,
{
	fn fmt_id(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.0.as_ref())?;
		f.write_str("/")?;
		f.write_str(self.1.as_ref())?;
		Ok(())
	}
}

impl<T1, T2, T3> ObjectId for (&'_ T1, &'_ T2, &'_ T3)
where
	T1: AsRef<str> + ?Sized,
	T2: AsRef<str> + ?Sized,
	T3: AsRef<str> + ?Sized,
{
	fn fmt_id(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.0.as_ref())?;
		f.write_str("/")?;
		f.write_str(self.1.as_ref())?;
		f.write_str("/")?;
		f.write_str(self.2.as_ref())?;
		Ok(())
	}
}

pub(crate) struct DisplayObjectId<T>(pub(crate) T);

impl<T> std::fmt::Display for DisplayObjectId<T> where T: ObjectId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt_id(f)
	}
}
