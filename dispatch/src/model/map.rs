use super::Model;
use crate::{
    invalid_parameters, key_not_found, ElementType, Error, Hardware, OperationTag, StreamId,
};
use std::{collections::HashMap, sync::Arc};

/// (操作类型, 元素类型) 到模型的映射，每个执行流一个。
///
/// 只接受为所属流构造的模型。
pub struct ModelMap<H: Hardware> {
    stream: StreamId,
    models: HashMap<(OperationTag, ElementType), Arc<Model<H>>>,
}

impl<H: Hardware> ModelMap<H> {
    #[inline]
    pub(crate) fn new(stream: StreamId) -> Self {
        Self {
            stream,
            models: HashMap::new(),
        }
    }

    /// 所属执行流。
    #[inline]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// 查找模型，不存在时不会构造默认值。
    pub fn get(&self, op: OperationTag, dtype: ElementType) -> Result<Arc<Model<H>>, Error> {
        self.models
            .get(&(op, dtype))
            .cloned()
            .ok_or_else(|| key_not_found(format!("no model for ({op}, {dtype})")))
    }

    /// 设置模型，覆盖已有的项。
    ///
    /// 模型必须为本表所属的流构造，且模板的操作类型与 `op` 一致。
    pub fn set(
        &mut self,
        op: OperationTag,
        dtype: ElementType,
        model: Model<H>,
    ) -> Result<(), Error> {
        if model.stream() != self.stream {
            return Err(invalid_parameters(format!(
                "model bound to stream {} cannot be set on stream {}",
                model.stream(),
                self.stream,
            )));
        }
        if model.template().op() != op {
            return Err(invalid_parameters(format!(
                "model of {} cannot be set for {op}",
                model.template().op(),
            )));
        }
        self.models.insert((op, dtype), Arc::new(model));
        Ok(())
    }

    #[inline]
    pub fn remove(&mut self, op: OperationTag, dtype: ElementType) -> Option<Arc<Model<H>>> {
        self.models.remove(&(op, dtype))
    }

    #[inline]
    pub fn contains(&self, op: OperationTag, dtype: ElementType) -> bool {
        self.models.contains_key(&(op, dtype))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = (OperationTag, ElementType)> + '_ {
        self.models.keys().copied()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        common_cpu::Cpu,
        model::Model,
        templates::{FetchingPolicy::*, ReductionParameters, Template, VectorAxpyParameters},
        ElementType, ErrorKind, OperationTag, Runtime,
    };

    #[test]
    fn test_set_get() {
        let mut rt = Runtime::default();
        let ctx = rt.add_context(Cpu::default());
        let stream = &ctx.streams()[0];
        let device = stream.device().clone();

        let t = Template::new(
            OperationTag::VectorAxpy,
            VectorAxpyParameters::new(1, 128, 128, FetchFromGlobalStrided),
            &device,
        )
        .unwrap();
        stream.models().set(
            OperationTag::VectorAxpy,
            ElementType::F32,
            Model::new(t.clone(), stream),
        )
        .unwrap();
        let model = stream
            .models()
            .get(OperationTag::VectorAxpy, ElementType::F32)
            .unwrap();
        assert_eq!(model.template(), &t);
        assert_eq!(model.compiled(), None);

        // 覆盖
        let t2 = Template::new(
            OperationTag::VectorAxpy,
            VectorAxpyParameters::new(4, 64, 16, FetchFromGlobalContiguous),
            &device,
        )
        .unwrap();
        stream.models().set(
            OperationTag::VectorAxpy,
            ElementType::F32,
            Model::new(t2.clone(), stream),
        )
        .unwrap();
        let models = stream.models();
        assert_eq!(models.len(), 1);
        assert_eq!(
            models
                .get(OperationTag::VectorAxpy, ElementType::F32)
                .unwrap()
                .template(),
            &t2
        );
    }

    #[test]
    fn test_key_not_found() {
        let mut rt = Runtime::default();
        let ctx = rt.add_context(Cpu::default());
        let stream = &ctx.streams()[0];
        let t = Template::new(
            OperationTag::Reduction,
            ReductionParameters::new(1, 256, 64, FetchFromLocal),
            stream.device(),
        )
        .unwrap();
        stream.models().set(
            OperationTag::Reduction,
            ElementType::F32,
            Model::new(t.clone(), stream),
        )
        .unwrap();

        let e = stream
            .models()
            .get(OperationTag::Reduction, ElementType::F64)
            .err()
            .unwrap();
        assert_eq!(e.kind, ErrorKind::KeyNotFound);
        assert!(e.info.contains("reduction"), "{}", e.info);
        assert!(e.info.contains("float64"), "{}", e.info);

        let models = stream.models();
        assert!(!models.contains(OperationTag::Reduction, ElementType::F64));
        let f32 = models
            .get(OperationTag::Reduction, ElementType::F32)
            .unwrap();
        assert_eq!(f32.template(), &t);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut rt = Runtime::new(crate::Config {
            streams: 2,
            ..Default::default()
        });
        let ctx = rt.add_context(Cpu::default());
        let [s0, s1] = [&ctx.streams()[0], &ctx.streams()[1]];
        let t = Template::new(
            OperationTag::VectorAxpy,
            VectorAxpyParameters::new(1, 128, 128, FetchFromGlobalStrided),
            s0.device(),
        )
        .unwrap();
        s0.models()
            .set(OperationTag::VectorAxpy, ElementType::I32, Model::new(t, s0))
            .unwrap();
        assert!(s0.models().contains(OperationTag::VectorAxpy, ElementType::I32));
        assert!(s1.models().is_empty());
    }

    #[test]
    fn test_bound_to_stream() {
        let mut rt = Runtime::new(crate::Config {
            streams: 2,
            ..Default::default()
        });
        let ctx = rt.add_context(Cpu::default());
        let [s0, s1] = [&ctx.streams()[0], &ctx.streams()[1]];
        let t = Template::new(
            OperationTag::VectorAxpy,
            VectorAxpyParameters::new(1, 128, 128, FetchFromGlobalStrided),
            s0.device(),
        )
        .unwrap();

        let model = Model::new(t.clone(), s0);
        assert_eq!(model.stream(), s0.id());
        let e = s1
            .models()
            .set(OperationTag::VectorAxpy, ElementType::F32, model)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidParameters);
        assert!(s1.models().is_empty());
        assert_eq!(s1.models().stream(), s1.id());

        let e = s0
            .set_model(OperationTag::Reduction, ElementType::F32, Model::new(t, s0))
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidParameters);
        assert!(e.info.contains("reduction"), "{}", e.info);
        assert!(s0.models().is_empty());
    }
}
