use std::marker::PhantomData;

use crate::{
  error::MultiError, multi::Multi, subscriber::BoxedSubscriber, subscription::EmptySubscription,
};

/// Complete right after subscription, without items.
pub fn empty<Item>() -> Empty<Item> { Empty(PhantomData) }

/// Fail right after subscription with the error built by `factory`. The
/// factory runs once per subscription.
pub fn fail_with<Item, F>(factory: F) -> FailWith<Item, F>
where
  F: Fn() -> MultiError,
{
  FailWith { factory, _item: PhantomData }
}

pub struct Empty<Item>(PhantomData<fn() -> Item>);

impl<Item> Clone for Empty<Item> {
  fn clone(&self) -> Self { Empty(PhantomData) }
}

impl<Item: Send + 'static> Multi for Empty<Item> {
  type Item = Item;

  fn subscribe(&self, subscriber: BoxedSubscriber<Item>) {
    subscriber.on_subscribe(EmptySubscription::boxed());
    subscriber.on_complete();
  }
}

#[derive(Clone)]
pub struct FailWith<Item, F> {
  factory: F,
  _item: PhantomData<fn() -> Item>,
}

impl<Item, F> Multi for FailWith<Item, F>
where
  Item: Send + 'static,
  F: Fn() -> MultiError + Send + Sync,
{
  type Item = Item;

  fn subscribe(&self, subscriber: BoxedSubscriber<Item>) {
    subscriber.on_subscribe(EmptySubscription::boxed());
    subscriber.on_error((self.factory)());
  }
}
